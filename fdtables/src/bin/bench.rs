//! Headless benchmark for the descriptor scan.
//!
//! Runs full scans of /proc in a loop and outputs timing data, optionally
//! as JSON. Useful for comparing sequential and pooled scans.
//!
//! Run: ./target/release/fdtables-bench --iterations 50 --workers 4 --json

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use fdtables::{ScanOptions, Scanner};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "fdtables-bench", about = "Benchmark the fdtables scan")]
struct Cli {
    /// Number of timed iterations
    #[arg(short, long, default_value_t = 50)]
    iterations: usize,

    /// Number of warmup iterations (not timed)
    #[arg(short, long, default_value_t = 5)]
    warmup: usize,

    /// Resolve this many processes concurrently
    #[arg(short = 'j', long, default_value_t = 1)]
    workers: usize,

    /// Per-process timeout in milliseconds (0 = never)
    #[arg(long, default_value_t = 0)]
    timeout_ms: u64,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct BenchResult {
    iterations: usize,
    warmup: usize,
    workers: usize,
    process_count: usize,
    descriptor_count: usize,
    timings_us: Vec<f64>,
    stats: Stats,
    system: SystemMeta,
}

#[derive(Serialize)]
struct Stats {
    min_us: f64,
    max_us: f64,
    mean_us: f64,
    median_us: f64,
    p95_us: f64,
    p99_us: f64,
    stddev_us: f64,
}

#[derive(Serialize)]
struct SystemMeta {
    kernel: String,
    arch: String,
    cpus: usize,
    hostname: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let options = ScanOptions {
        workers: cli.workers.max(1),
        timeout: (cli.timeout_ms > 0).then(|| Duration::from_millis(cli.timeout_ms)),
    };
    let scanner = Scanner::for_current_user(options);

    eprintln!("Running {} warmup iterations...", cli.warmup);
    let mut last_count = 0;
    for _ in 0..cli.warmup {
        let (inventory, _) = scanner.scan()?;
        last_count = inventory.len();
    }
    eprintln!(
        "Warmup done. {} descriptors seen. Running {} timed iterations...",
        last_count, cli.iterations
    );

    let mut timings_us = Vec::with_capacity(cli.iterations);
    let mut process_count = 0;
    let mut descriptor_count = 0;

    for i in 0..cli.iterations {
        let start = Instant::now();
        let (inventory, report) = scanner.scan()?;
        let elapsed = start.elapsed();

        process_count = report.processes_scanned;
        descriptor_count = inventory.len();
        let us = elapsed.as_secs_f64() * 1_000_000.0;
        timings_us.push(us);

        if !cli.json && (i + 1) % 10 == 0 {
            eprintln!(
                "  [{}/{}] {:.0} µs, {} processes, {} descriptors",
                i + 1,
                cli.iterations,
                us,
                process_count,
                descriptor_count
            );
        }
    }

    let stats = compute_stats(&timings_us);
    let system = get_system_meta();

    let result = BenchResult {
        iterations: cli.iterations,
        warmup: cli.warmup,
        workers: options.workers,
        process_count,
        descriptor_count,
        timings_us,
        stats,
        system,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("\n=== fdtables Benchmark Results ===");
        eprintln!("Iterations: {}", result.iterations);
        eprintln!("Workers: {}", result.workers);
        eprintln!("Processes: {}", result.process_count);
        eprintln!("Descriptors: {}", result.descriptor_count);
        eprintln!("Min:    {:.1} µs", result.stats.min_us);
        eprintln!("Max:    {:.1} µs", result.stats.max_us);
        eprintln!("Mean:   {:.1} µs", result.stats.mean_us);
        eprintln!("Median: {:.1} µs", result.stats.median_us);
        eprintln!("P95:    {:.1} µs", result.stats.p95_us);
        eprintln!("P99:    {:.1} µs", result.stats.p99_us);
        eprintln!("Stddev: {:.1} µs", result.stats.stddev_us);
    }

    Ok(())
}

fn compute_stats(timings: &[f64]) -> Stats {
    if timings.is_empty() {
        return Stats {
            min_us: 0.0,
            max_us: 0.0,
            mean_us: 0.0,
            median_us: 0.0,
            p95_us: 0.0,
            p99_us: 0.0,
            stddev_us: 0.0,
        };
    }

    let mut sorted = timings.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

    Stats {
        min_us: sorted[0],
        max_us: sorted[sorted.len() - 1],
        mean_us: mean,
        median_us: percentile(&sorted, 50.0),
        p95_us: percentile(&sorted, 95.0),
        p99_us: percentile(&sorted, 99.0),
        stddev_us: variance.sqrt(),
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn get_system_meta() -> SystemMeta {
    let kernel = std::fs::read_to_string("/proc/version")
        .unwrap_or_default()
        .split_whitespace()
        .nth(2)
        .unwrap_or("unknown")
        .to_string();

    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let hostname = std::fs::read_to_string("/proc/sys/kernel/hostname")
        .unwrap_or_default()
        .trim()
        .to_string();

    SystemMeta {
        kernel,
        arch: std::env::consts::ARCH.to_string(),
        cpus,
        hostname,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_gives_zeroed_stats() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.min_us, 0.0);
        assert_eq!(stats.max_us, 0.0);
        assert_eq!(stats.mean_us, 0.0);
        assert_eq!(stats.median_us, 0.0);
        assert_eq!(stats.p99_us, 0.0);
        assert_eq!(stats.stddev_us, 0.0);
    }

    #[test]
    fn single_sample_is_every_statistic() {
        let stats = compute_stats(&[42.5]);
        for value in [
            stats.min_us,
            stats.max_us,
            stats.mean_us,
            stats.median_us,
            stats.p95_us,
            stats.p99_us,
        ] {
            assert_eq!(value, 42.5);
        }
        assert_eq!(stats.stddev_us, 0.0);
    }

    #[test]
    fn unsorted_samples_are_ranked() {
        let timings: Vec<f64> = (1..=100).rev().map(f64::from).collect();
        let stats = compute_stats(&timings);
        assert_eq!(stats.min_us, 1.0);
        assert_eq!(stats.max_us, 100.0);
        assert_eq!(stats.mean_us, 50.5);
        assert_eq!(stats.p95_us, 95.0);
        assert_eq!(stats.p99_us, 99.0);
    }
}
