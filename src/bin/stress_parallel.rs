//! Parallel stress test - identical inputs on every thread must produce
//! bit-identical outputs, and throughput should scale with threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use myerson_mm::boundary::TierBoundarySolver;
use myerson_mm::config::Config;
use myerson_mm::distribution::PerformanceDistribution;
use myerson_mm::reward::{Integration, RewardIntegrator};
use myerson_mm::virtual_value::{compute_virtual_value, ValuationStrategy};

fn generate_scores(n: usize, seed: u64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let phase = i as f64 * 0.37 + seed as f64;
            50.0 + 30.0 * phase.sin() + 10.0 * (phase * 0.13).cos()
        })
        .collect()
}

/// One full pass over the grid; returns a fold of the output bits.
fn run_pass(dist: &PerformanceDistribution, cfg: &Config) -> u64 {
    let strategy = ValuationStrategy::from_config(cfg);
    let solver = TierBoundarySolver::new(strategy).with_limits(cfg.bisection_iterations, cfg.bisection_tolerance);
    let rewards = RewardIntegrator::new(strategy, Integration::for_context(strategy.context(), cfg));

    let mut acc = 0u64;
    if let Ok(b) = solver.solve(dist) {
        acc ^= b.upper_root.to_bits() ^ b.lower_root.to_bits().rotate_left(17);
    }
    let mut score = dist.min;
    while score <= dist.max {
        if let Ok(vv) = compute_virtual_value(score, dist, &strategy) {
            acc = acc.rotate_left(5) ^ vv.virtual_value.to_bits();
        }
        if let Ok(r) = rewards.cumulative_reward(score, dist) {
            acc = acc.rotate_left(3) ^ r.to_bits();
        }
        score += 2.5;
    }
    acc
}

fn get_memory_mb() -> f64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|s| s.split_whitespace().nth(1)?.parse::<usize>().ok())
        .map(|pages| pages as f64 * 4096.0 / 1_000_000.0)
        .unwrap_or(0.0)
}

fn main() {
    println!("=== PARALLEL STRESS TEST ===\n");

    let n_threads = num_cpus::get().min(8);
    let samples = 2_000;
    let iterations = 10;

    println!("Threads: {}", n_threads);
    println!("Samples: {}", samples);
    println!("Iterations: {}", iterations);
    println!();

    let cfg = Config::from_env();
    let dist = match PerformanceDistribution::from_samples(generate_scores(samples, 7), 1) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            eprintln!("failed to build distribution: {}", e);
            std::process::exit(1);
        }
    };
    let reference = run_pass(&dist, &cfg);
    let mismatches = Arc::new(AtomicU64::new(0));
    let passes = Arc::new(AtomicU64::new(0));

    let start = Instant::now();
    let initial_mem = get_memory_mb();

    println!("{:>10} {:>12} {:>12} {:>12}", "Iteration", "Time", "Mismatches", "Memory MB");
    println!("{}", "-".repeat(50));

    for iter in 0..iterations {
        let iter_start = Instant::now();
        let mut handles = vec![];

        for _ in 0..n_threads {
            let cfg = cfg.clone();
            let dist = Arc::clone(&dist);
            let mismatches = Arc::clone(&mismatches);
            let passes = Arc::clone(&passes);
            handles.push(thread::spawn(move || {
                if run_pass(&dist, &cfg) != reference {
                    mismatches.fetch_add(1, Ordering::Relaxed);
                }
                passes.fetch_add(1, Ordering::Relaxed);
            }));
        }

        for h in handles {
            h.join().expect("Thread panicked!");
        }

        println!(
            "{:>10} {:>10.1}ms {:>12} {:>12.1}",
            iter,
            iter_start.elapsed().as_secs_f64() * 1000.0,
            mismatches.load(Ordering::Relaxed),
            get_memory_mb()
        );
    }

    let elapsed = start.elapsed().as_secs_f64();
    let total_passes = passes.load(Ordering::Relaxed);
    let total_mismatches = mismatches.load(Ordering::Relaxed);
    println!();
    println!("Passes: {} ({:.1}/sec)", total_passes, total_passes as f64 / elapsed);
    println!("Memory growth: {:.1} MB", get_memory_mb() - initial_mem);

    if total_mismatches > 0 {
        println!("FAIL: {} passes diverged from the reference", total_mismatches);
        std::process::exit(1);
    }
    println!("PASS: every thread reproduced the reference output");
}
