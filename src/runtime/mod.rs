//! Benchmark driver built on the transfer and framing layers.
//!
//! - `setup`: per-socket options and thread pinning
//! - `connection`: per-descriptor context (transport, window, accumulator)
//! - `server`: mio readiness loop echoing ping messages
//! - `client`: blocking ping-pong producing a [`RunSummary`]

pub mod client;
pub mod connection;
pub mod server;
pub mod setup;

pub use client::RunSummary;
pub use connection::{Connection, ConnectionRegistry, ConnectionSettings, MessageHandler};
pub use server::{Server, ServerStats};
pub use setup::{
    apply_rate_limit, parse_cpu_list, pin_current_thread, prepare_socket, SetupError,
    SocketOptions,
};

use crate::config::{Config, Mode};
use std::sync::atomic::AtomicBool;
use tracing::info;

/// What a run produced, depending on the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReport {
    Server(ServerStats),
    Client(RunSummary),
}

/// Run the configured side until it finishes or `stop` is set.
pub fn run(config: &Config, stop: &AtomicBool) -> std::io::Result<RunReport> {
    match config.mode {
        Mode::Server => {
            info!("Using mio runtime (epoll/kqueue)");
            let server = Server::bind(config)?;
            Ok(RunReport::Server(server.run(stop)?))
        }
        Mode::Client => Ok(RunReport::Client(client::run(config)?)),
    }
}
