//! Per-descriptor processing context.
//!
//! A `Connection` owns everything one descriptor needs: the transport (via
//! its `Descriptor`), the receive window and the accumulator. Nothing here
//! is shared between descriptors.

use super::setup::{prepare_socket, SocketOptions};
use crate::config::Config;
use crate::framing::{Accumulator, BufferWindow, Feed, FrameState, FramingError, Strategy};
use crate::message::MessageShape;
use crate::transfer::{
    receive_once, send_message, Descriptor, Direction, ErrorReporter, FatalError, PeerAddress,
    RawSocket, Received, Transfer, TransferOutcome,
};
use slab::Slab;
use socket2::Socket;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use tracing::warn;

/// Everything needed to turn a socket into a [`Connection`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub shape: MessageShape,
    pub strategy: Strategy,
    pub window_capacity: usize,
    pub nonblocking_send: bool,
    pub rate_limit: u64,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            shape: config.shape,
            strategy: config.strategy,
            window_capacity: config.window_capacity(),
            nonblocking_send: config.nonblocking_send,
            rate_limit: config.rate_limit,
        }
    }
}

/// Called once per complete message with the descriptor (for replies), the
/// datagram source (if any) and the message bytes. Return `false` to stop
/// extracting messages from the current delivery.
pub type MessageHandler<'f> = dyn FnMut(&mut Descriptor, Option<PeerAddress>, &[u8]) -> bool + 'f;

pub struct Connection {
    desc: Descriptor,
    window: BufferWindow<'static>,
    framer: Box<dyn Accumulator>,
    shape: MessageShape,
    strategy: Strategy,
    /// Source of the most recent datagram, used when resuming.
    last_peer: Option<PeerAddress>,
}

impl Connection {
    /// Build a connection with an owned window of `window_capacity` bytes.
    ///
    /// The in-place strategy needs a window that fits the largest message.
    pub fn new(
        desc: Descriptor,
        shape: MessageShape,
        strategy: Strategy,
        window_capacity: usize,
    ) -> Result<Self, FramingError> {
        if strategy == Strategy::InPlace && window_capacity < shape.max_message_size() {
            return Err(FramingError::WindowTooSmall {
                needed: shape.max_message_size(),
                capacity: window_capacity,
            });
        }
        Ok(Self {
            desc,
            window: BufferWindow::with_capacity(window_capacity),
            framer: strategy.build(shape),
            shape,
            strategy,
            last_peer: None,
        })
    }

    /// Set up `socket` and wrap it as a raw-transport connection.
    ///
    /// `nonblocking` puts the whole descriptor in non-blocking mode, as a
    /// readiness loop needs; `settings.nonblocking_send` only affects sends.
    pub fn open(
        socket: Socket,
        settings: &ConnectionSettings,
        nonblocking: bool,
        reporter: Arc<dyn ErrorReporter>,
    ) -> io::Result<Self> {
        prepare_socket(
            &socket,
            &SocketOptions {
                nonblocking,
                rate_limit: settings.rate_limit,
            },
        )?;
        let fd = socket.as_raw_fd();
        let transport = RawSocket::new(socket, settings.nonblocking_send)?;
        let desc = Descriptor::new(fd, Box::new(transport), reporter);
        Self::new(
            desc,
            settings.shape,
            settings.strategy,
            settings.window_capacity,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    pub fn fd(&self) -> RawFd {
        self.desc.fd()
    }

    pub fn descriptor_mut(&mut self) -> &mut Descriptor {
        &mut self.desc
    }

    pub fn shape(&self) -> &MessageShape {
        &self.shape
    }

    pub fn state(&self) -> FrameState {
        self.framer.state()
    }

    /// Send one whole message. A signal never leaves half of it behind.
    pub fn send(&mut self, buf: &[u8], dest: Option<&PeerAddress>) -> Transfer {
        send_message(&mut self.desc, buf, dest)
    }

    /// One read attempt; on success, every message it completes is passed
    /// to `on_message` before this returns.
    ///
    /// A framing violation turns the result into `Fatal` and is reported.
    pub fn receive(&mut self, on_message: &mut MessageHandler<'_>) -> Received {
        let received = receive_once(&mut self.desc, &mut self.window);
        if received.outcome != TransferOutcome::Complete {
            return received;
        }
        if received.peer.is_some() {
            self.last_peer = received.peer;
        }

        match self.extract(received.bytes, received.peer, on_message) {
            Ok(_) => received,
            Err(err) => {
                warn!(fd = self.desc.fd(), error = %err, "Framing violation");
                let fatal = FatalError::new(io::ErrorKind::InvalidData);
                self.desc
                    .report(Direction::Receive, received.bytes, received.peer, fatal);
                Received {
                    outcome: TransferOutcome::Fatal(fatal),
                    ..received
                }
            }
        }
    }

    /// Drop buffered bytes and start over at a message boundary.
    ///
    /// Only meaningful for datagram sockets, where every datagram starts a
    /// fresh message.
    pub fn reset(&mut self) {
        self.window.clear();
        self.framer.reset();
    }

    /// Deliver messages left behind when a handler returned `false`.
    pub fn resume(&mut self, on_message: &mut MessageHandler<'_>) -> Result<Feed, FramingError> {
        self.extract(0, self.last_peer, on_message)
    }

    fn extract(
        &mut self,
        received: usize,
        peer: Option<PeerAddress>,
        on_message: &mut MessageHandler<'_>,
    ) -> Result<Feed, FramingError> {
        let desc = &mut self.desc;
        self.framer
            .feed(&mut self.window, received, &mut |msg: &[u8]| {
                on_message(desc, peer, msg)
            })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("desc", &self.desc)
            .field("window", &self.window)
            .field("state", &self.framer.state())
            .finish()
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry {
    connections: Slab<Connection>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns the connection back if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection) -> Result<usize, Connection> {
        if self.connections.len() >= self.max_connections {
            return Err(conn);
        }
        Ok(self.connections.insert(conn))
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Connection> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
