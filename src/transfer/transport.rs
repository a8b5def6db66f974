//! Transport capability: the byte-moving primitive under both engines.

use super::outcome::{classify, TransferOutcome};
use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Source or destination of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress(pub SocketAddr);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

/// Which transport a descriptor was set up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Raw,
    Encrypted,
}

/// One classified write or read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub bytes: usize,
    pub outcome: TransferOutcome,
}

impl Attempt {
    fn from_result(result: &io::Result<usize>) -> Self {
        Self {
            bytes: *result.as_ref().unwrap_or(&0),
            outcome: classify(result),
        }
    }
}

/// Byte-level read/write over a raw or encrypted socket.
///
/// Chosen once when a descriptor is set up and never swapped afterwards.
/// Implementors supply the raw `send`/`recv`; the provided `write`/`read`
/// classify the result so every transport reports the same outcomes.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Write as much of `buf` as the transport accepts in one call.
    ///
    /// `dest` is only meaningful for unconnected datagram sockets.
    fn send(&mut self, buf: &[u8], dest: Option<&PeerAddress>) -> io::Result<usize>;

    /// Read whatever is available into `buf` in one call.
    ///
    /// Returns the source address for datagram sockets.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, Option<PeerAddress>)>;

    fn write(&mut self, buf: &[u8], dest: Option<&PeerAddress>) -> Attempt {
        Attempt::from_result(&self.send(buf, dest))
    }

    fn read(&mut self, buf: &mut [u8]) -> (Attempt, Option<PeerAddress>) {
        match self.recv(buf) {
            Ok((n, peer)) => (Attempt::from_result(&Ok(n)), peer),
            Err(err) => (Attempt::from_result(&Err(err)), None),
        }
    }
}
