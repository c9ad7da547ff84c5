//! Myersonian tiering core for market makers: virtual values, tier
//! boundaries, incentive-compatible rewards, crisis spreads, slashing,
//! crisis detection and tier-priority routing.

pub mod boundary;
pub mod config;
pub mod distribution;
pub mod error;
pub mod fixed;
pub mod logging;
pub mod mechanism;
pub mod oracle;
pub mod reward;
pub mod router;
pub mod slashing;
pub mod snapshot;
pub mod spread;
pub mod tier;
pub mod virtual_value;

pub use error::{MechanismError, Result};
pub use mechanism::Mechanism;
