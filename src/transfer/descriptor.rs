//! Per-descriptor context handed to both engines.

use super::outcome::FatalError;
use super::report::{Direction, ErrorReporter, Failure};
use super::transport::{PeerAddress, Transport, TransportKind};
use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// Everything the engines need to know about one descriptor.
///
/// Owns the transport picked at connection setup. Exactly one engine
/// operates on a descriptor at a time, which `&mut` borrows enforce.
pub struct Descriptor {
    fd: RawFd,
    transport: Box<dyn Transport>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Descriptor {
    pub fn new(fd: RawFd, transport: Box<dyn Transport>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            fd,
            transport,
            reporter,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub(crate) fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub(crate) fn report(
        &self,
        direction: Direction,
        bytes: usize,
        peer: Option<PeerAddress>,
        error: FatalError,
    ) {
        self.reporter.report(&Failure {
            fd: self.fd,
            direction,
            bytes,
            peer,
            error,
        });
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("fd", &self.fd)
            .field("kind", &self.transport.kind())
            .finish()
    }
}
