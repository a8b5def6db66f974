//! perfwire: message-level network benchmark.
//!
//! Runs either an echo server or a ping-pong client over TCP or UDP.
//! Configuration via CLI arguments or TOML file.

use perfwire::config::Config;
use perfwire::runtime::{self, parse_cpu_list, pin_current_thread, RunReport};
use std::sync::atomic::AtomicBool;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        mode = ?config.mode,
        address = %config.address,
        protocol = ?config.protocol,
        strategy = ?config.strategy,
        payload_size = config.payload_size,
        max_payload_size = config.shape.max_payload_size(),
        "Starting perfwire"
    );

    if let Some(ref list) = config.cpu_affinity {
        let cpus = parse_cpu_list(list)?;
        pin_current_thread(&cpus)?;
    }

    let stop = AtomicBool::new(false);
    match runtime::run(&config, &stop)? {
        RunReport::Server(stats) => info!(?stats, "Done"),
        RunReport::Client(summary) => println!(
            "sent={} received={} skipped={} lost={} rtt_us min={} avg={} max={}",
            summary.sent,
            summary.received,
            summary.skipped,
            summary.lost,
            summary.min_rtt.as_micros(),
            summary.avg_rtt.as_micros(),
            summary.max_rtt.as_micros(),
        ),
    }

    Ok(())
}
