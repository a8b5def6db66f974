//! Byte movement between application buffers and a transport.
//!
//! - `send_all`: drains a buffer onto the transport, retrying partial
//!   writes.
//! - `send_message`: `send_all` until the message is whole or untouched.
//! - `receive_once`: one read attempt into a window, no retry.
//!
//! Both classify every attempt into a [`TransferOutcome`] and hand fatal
//! failures to the descriptor's [`ErrorReporter`].

mod descriptor;
mod encrypted;
mod outcome;
mod raw;
mod recv;
pub(crate) mod report;
mod send;
pub(crate) mod transport;

pub use descriptor::Descriptor;
pub use encrypted::{ClientTlsStream, EncryptedSocket, ServerTlsStream};
pub use outcome::{classify, FatalError, Transfer, TransferOutcome};
pub use raw::RawSocket;
pub use recv::{receive_once, Received};
pub use report::{Direction, ErrorReporter, Failure, LogReporter};
pub use send::{send_all, send_message};
pub use transport::{Attempt, PeerAddress, Transport, TransportKind};
