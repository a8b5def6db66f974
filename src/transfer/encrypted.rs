//! Encrypted transport over an already established TLS session.
//!
//! The handshake happens before a descriptor is built; this module only
//! moves application bytes through the session's read/write side.

use super::transport::{PeerAddress, Transport, TransportKind};
use std::io::{self, Read, Write};
use std::net::TcpStream;

/// Client side of a rustls session over TCP.
pub type ClientTlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Server side of a rustls session over TCP.
pub type ServerTlsStream = rustls::StreamOwned<rustls::ServerConnection, TcpStream>;

/// Transport over an encrypted byte stream.
///
/// Errors come back as plain `io::Error`s, so the outcome classification is
/// the same as for [`RawSocket`](super::RawSocket). A peer that drops the
/// TCP connection without a close_notify surfaces as `UnexpectedEof` and is
/// treated as an orderly shutdown.
pub struct EncryptedSocket<S> {
    stream: S,
}

impl<S: Read + Write + Send> EncryptedSocket<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write + Send> Transport for EncryptedSocket<S> {
    fn kind(&self) -> TransportKind {
        TransportKind::Encrypted
    }

    /// Destination is ignored: a session is always connected.
    fn send(&mut self, buf: &[u8], _dest: Option<&PeerAddress>) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        // Push the resulting records out; WouldBlock here means they stay
        // queued in the session and go out with the next write.
        match self.stream.flush() {
            Ok(()) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock && n > 0 => Ok(n),
            Err(e) => Err(e),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, Option<PeerAddress>)> {
        let n = self.stream.read(buf)?;
        Ok((n, None))
    }
}

impl<S> std::fmt::Debug for EncryptedSocket<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedSocket").finish_non_exhaustive()
    }
}
