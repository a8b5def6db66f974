//! Plain socket transport.

use super::transport::{PeerAddress, Transport, TransportKind};
use socket2::{SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};

/// Suppress SIGPIPE on writes to a closed connection; EPIPE is returned instead.
#[cfg(any(target_os = "linux", target_os = "android"))]
const NO_SIGNAL: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const NO_SIGNAL: libc::c_int = 0;

/// Transport over a plain stream or datagram socket.
#[derive(Debug)]
pub struct RawSocket {
    socket: Socket,
    send_flags: libc::c_int,
    datagram: bool,
}

impl RawSocket {
    /// Wrap an already configured socket.
    ///
    /// With `nonblocking_send`, every send carries `MSG_DONTWAIT` even if the
    /// descriptor itself is in blocking mode.
    pub fn new(socket: Socket, nonblocking_send: bool) -> io::Result<Self> {
        let datagram = socket.r#type()? == Type::DGRAM;
        let mut send_flags = NO_SIGNAL;
        if nonblocking_send {
            send_flags |= libc::MSG_DONTWAIT;
        }
        Ok(Self {
            socket,
            send_flags,
            datagram,
        })
    }

    pub fn is_datagram(&self) -> bool {
        self.datagram
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl Transport for RawSocket {
    fn kind(&self) -> TransportKind {
        TransportKind::Raw
    }

    fn send(&mut self, buf: &[u8], dest: Option<&PeerAddress>) -> io::Result<usize> {
        match dest {
            Some(dest) if self.datagram => {
                self.socket
                    .send_to_with_flags(buf, &SockAddr::from(dest.0), self.send_flags)
            }
            _ => self.socket.send_with_flags(buf, self.send_flags),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, Option<PeerAddress>)> {
        // SAFETY: `[u8]` and `[MaybeUninit<u8>]` share layout, and recvfrom
        // only ever writes initialized bytes into the slice.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (n, addr) = self.socket.recv_from_with_flags(uninit, NO_SIGNAL)?;
        let peer = if self.datagram {
            addr.as_socket().map(PeerAddress)
        } else {
            None
        };
        Ok((n, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::BufferWindow;
    use crate::transfer::report::recording::RecordingReporter;
    use crate::transfer::{receive_once, send_all, Descriptor, TransferOutcome};
    use std::net::UdpSocket;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    fn descriptor(socket: Socket, nonblocking_send: bool) -> Descriptor {
        let fd = socket.as_raw_fd();
        let transport = RawSocket::new(socket, nonblocking_send).unwrap();
        Descriptor::new(fd, Box::new(transport), Arc::new(RecordingReporter::default()))
    }

    #[test]
    fn test_stream_roundtrip() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut tx = descriptor(Socket::from(a), false);
        let mut rx = descriptor(Socket::from(b), false);

        let sent = send_all(&mut tx, b"hello over a stream", None);
        assert_eq!(sent.outcome, TransferOutcome::Complete);
        assert_eq!(sent.bytes, 19);

        let mut window = BufferWindow::with_capacity(64);
        let got = receive_once(&mut rx, &mut window);
        assert_eq!(got.outcome, TransferOutcome::Complete);
        assert_eq!(got.peer, None);
        window.advance(got.bytes);
        assert_eq!(window.filled(), b"hello over a stream");
    }

    #[test]
    fn test_closed_peer_reads_shutdown() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let mut rx = descriptor(Socket::from(b), false);
        let mut window = BufferWindow::with_capacity(64);

        let got = receive_once(&mut rx, &mut window);

        assert_eq!(got.outcome, TransferOutcome::ShutdownByPeer);
        assert_eq!(got.bytes, 0);
    }

    #[test]
    fn test_write_to_closed_peer_is_shutdown() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let mut tx = descriptor(Socket::from(a), false);

        let sent = send_all(&mut tx, b"nobody listening", None);

        assert_eq!(sent.outcome, TransferOutcome::ShutdownByPeer);
    }

    #[test]
    fn test_full_send_buffer_would_block() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut raw = RawSocket::new(Socket::from(a), true).unwrap();
        let chunk = vec![0u8; 64 * 1024];

        // Fill the socket buffer until the kernel refuses more
        loop {
            let attempt = raw.write(&chunk, None);
            if attempt.outcome == TransferOutcome::WouldBlockPartial {
                break;
            }
            assert_eq!(attempt.outcome, TransferOutcome::Complete);
        }

        let fd = raw.as_raw_fd();
        let mut tx = Descriptor::new(fd, Box::new(raw), Arc::new(RecordingReporter::default()));
        let sent = send_all(&mut tx, b"x", None);
        assert_eq!(sent.outcome, TransferOutcome::WouldBlockPartial);
        assert_eq!(sent.bytes, 0);
    }

    #[test]
    fn test_datagram_peer_address() {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = PeerAddress(b.local_addr().unwrap());

        let mut tx = descriptor(Socket::from(a), false);
        let mut rx = descriptor(Socket::from(b), false);

        let sent = send_all(&mut tx, b"datagram", Some(&b_addr));
        assert_eq!(sent.outcome, TransferOutcome::Complete);

        let mut window = BufferWindow::with_capacity(64);
        let got = receive_once(&mut rx, &mut window);
        assert_eq!(got.outcome, TransferOutcome::Complete);
        assert_eq!(got.bytes, 8);
        assert_eq!(got.peer, Some(PeerAddress(a_addr)));
    }
}
