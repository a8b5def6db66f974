//! perfwire: message-level network throughput and latency benchmark.
//!
//! The core is a pair of transfer engines that make partial reads and
//! writes on raw or encrypted sockets explicit, plus an accumulator that
//! stitches raw deliveries back into length-prefixed messages:
//!
//! - [`transfer`]: `send_all` / `receive_once` and the outcome taxonomy
//! - [`framing`]: receive window and in-place / copying accumulators
//! - [`message`]: wire header and message shape
//! - [`runtime`]: socket setup, connections, echo server and ping-pong client
//! - [`config`]: CLI and TOML configuration

pub mod config;
pub mod framing;
pub mod message;
pub mod runtime;
pub mod transfer;
