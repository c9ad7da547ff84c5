//! Guarded arithmetic shared by both valuation contexts.
//!
//! The approximate context works in signed fixed point (`i128`, six decimal
//! places) so results are reproducible bit-for-bit on any host. Every division
//! with a possibly-zero denominator takes an explicit fallback instead of
//! failing mid-evaluation.

/// Fixed-point scale: 1.0 == 1_000_000.
pub const SCALE: i128 = 1_000_000;

/// Epsilon used by the floating-point (precise) context.
pub const EPSILON: f64 = 1e-9;

/// Convert to fixed point, rounding half away from zero.
/// Non-finite input maps to 0.
pub fn to_fixed(value: f64) -> i128 {
    if !value.is_finite() {
        return 0;
    }
    (value * SCALE as f64).round() as i128
}

pub fn from_fixed(value: i128) -> f64 {
    value as f64 / SCALE as f64
}

/// Fixed-point product: `a * b / SCALE`.
pub fn mul(a: i128, b: i128) -> i128 {
    a.saturating_mul(b) / SCALE
}

/// `a * b / den`, or `fallback` when `den == 0`.
pub fn mul_div(a: i128, b: i128, den: i128, fallback: i128) -> i128 {
    if den == 0 {
        return fallback;
    }
    a.saturating_mul(b) / den
}

/// Floating division that degrades to `fallback` when the denominator is zero
/// or the quotient is not finite.
pub fn guarded_div(num: f64, den: f64, fallback: f64) -> f64 {
    if den == 0.0 {
        return fallback;
    }
    let q = num / den;
    if q.is_finite() {
        q
    } else {
        fallback
    }
}

/// Integer basis-point ratio `num * 10_000 / den`, or `fallback` when `den == 0`.
pub fn ratio_bps(num: u64, den: u64, fallback: u64) -> u64 {
    if den == 0 {
        return fallback;
    }
    let q = (num as u128) * 10_000 / den as u128;
    q.min(u64::MAX as u128) as u64
}
