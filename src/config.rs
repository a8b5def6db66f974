//! Configuration module for perfwire.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::framing::Strategy;
use crate::message::{MessageShape, ShapeError};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which side of the benchmark to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Server,
    Client,
}

/// Socket type carrying the messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "perfwire")]
#[command(version = "0.1.0")]
#[command(about = "Message-level network throughput and latency benchmark", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run as server (echo) or client (ping-pong)
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Address to bind (server) or connect to (client)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Transport protocol
    #[arg(short, long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Payload bytes per message sent by the client
    #[arg(short = 'm', long)]
    pub payload_size: Option<usize>,

    /// Largest payload a peer may announce
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Messages to send (client)
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Leading messages excluded from statistics (client)
    #[arg(long)]
    pub warmup: Option<u64>,

    /// Accumulation strategy for incoming messages
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Send with MSG_DONTWAIT
    #[arg(long)]
    pub nonblocking_send: bool,

    /// Socket pacing rate in bytes per second (0 = unlimited)
    #[arg(long)]
    pub rate_limit: Option<u64>,

    /// CPUs to pin the worker thread to (e.g. "0,2-3")
    #[arg(long)]
    pub cpu_affinity: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network-related configuration
#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub protocol: Protocol,
    /// How long the client waits for an echo before counting it lost
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            address: default_address(),
            protocol: Protocol::default(),
            reply_timeout_ms: default_reply_timeout_ms(),
        }
    }
}

/// Message-related configuration
#[derive(Debug, Deserialize)]
pub struct MessageConfig {
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
    #[serde(default = "default_max_sequence_number")]
    pub max_sequence_number: u64,
    #[serde(default = "default_count")]
    pub count: u64,
    #[serde(default = "default_warmup")]
    pub warmup: u64,
    #[serde(default)]
    pub strategy: Strategy,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            payload_size: default_payload_size(),
            max_payload_size: default_max_payload_size(),
            max_sequence_number: default_max_sequence_number(),
            count: default_count(),
            warmup: default_warmup(),
            strategy: Strategy::default(),
        }
    }
}

/// Per-socket options, applied before any transfer starts
#[derive(Debug, Deserialize, Default)]
pub struct SocketConfig {
    #[serde(default)]
    pub nonblocking_send: bool,
    #[serde(default)]
    pub rate_limit: u64,
    pub cpu_affinity: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:11111".to_string()
}

fn default_reply_timeout_ms() -> u64 {
    1000
}

fn default_payload_size() -> usize {
    64
}

fn default_max_payload_size() -> usize {
    65_000
}

fn default_max_sequence_number() -> u64 {
    u64::MAX
}

fn default_count() -> u64 {
    10_000
}

fn default_warmup() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub address: String,
    pub protocol: Protocol,
    pub reply_timeout: Duration,
    pub shape: MessageShape,
    pub payload_size: usize,
    pub count: u64,
    pub warmup: u64,
    pub strategy: Strategy,
    pub nonblocking_send: bool,
    pub rate_limit: u64,
    pub cpu_affinity: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge CLI args over the TOML file they point at (if any).
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let max_payload_size = cli
            .max_payload_size
            .unwrap_or(file.message.max_payload_size);
        let shape =
            MessageShape::with_default_header(max_payload_size, file.message.max_sequence_number)?;

        let payload_size = cli.payload_size.unwrap_or(file.message.payload_size);
        if payload_size > shape.max_payload_size() {
            return Err(ConfigError::PayloadTooLarge {
                payload_size,
                max_payload_size,
            });
        }

        let count = cli.count.unwrap_or(file.message.count);
        let warmup = cli.warmup.unwrap_or(file.message.warmup);
        if warmup > count {
            return Err(ConfigError::WarmupExceedsCount { warmup, count });
        }

        Ok(Config {
            mode: cli.mode.unwrap_or(file.network.mode),
            address: cli.address.unwrap_or(file.network.address),
            protocol: cli.protocol.unwrap_or(file.network.protocol),
            reply_timeout: Duration::from_millis(file.network.reply_timeout_ms),
            shape,
            payload_size,
            count,
            warmup,
            strategy: cli.strategy.unwrap_or(file.message.strategy),
            nonblocking_send: cli.nonblocking_send || file.socket.nonblocking_send,
            rate_limit: cli.rate_limit.unwrap_or(file.socket.rate_limit),
            cpu_affinity: cli.cpu_affinity.or(file.socket.cpu_affinity),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                file.logging.level
            },
        })
    }

    /// Receive window size: room for the largest message, and at least a
    /// typical datagram batch.
    pub fn window_capacity(&self) -> usize {
        self.shape.max_message_size().max(64 * 1024)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid message shape: {0}")]
    Shape(#[from] ShapeError),
    #[error("Payload size {payload_size} exceeds max payload size {max_payload_size}")]
    PayloadTooLarge {
        payload_size: usize,
        max_payload_size: usize,
    },
    #[error("Warmup count {warmup} exceeds message count {count}")]
    WarmupExceedsCount { warmup: u64, count: u64 },
}
