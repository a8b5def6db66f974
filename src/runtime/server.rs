//! Echo server.
//!
//! Readiness-based: mio tells us when a socket is readable, then each
//! connection drains it with non-blocking reads until the kernel has
//! nothing left. Every message flagged `PONG_REQUEST` is sent straight
//! back from the receive window. Uses epoll on Linux, kqueue on macOS.

use super::connection::{Connection, ConnectionRegistry, ConnectionSettings};
use crate::config::{Config, Protocol};
use crate::framing::FrameState;
use crate::message::{flags, MessageHeader, MessageShape};
use crate::transfer::{
    send_message, Descriptor, ErrorReporter, LogReporter, PeerAddress, TransferOutcome,
};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Token of the listening TCP socket, or of the UDP socket.
const SOCKET_TOKEN: Token = Token(usize::MAX);

const MAX_CONNECTIONS: usize = 4096;
const EVENT_CAPACITY: usize = 256;

/// How often the loop wakes up to check the stop flag.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Counters kept over the lifetime of a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub closed: u64,
    pub messages: u64,
    pub echoed: u64,
    /// Echoes dropped because the socket could not take them right away.
    pub skipped: u64,
    /// Messages whose header could not be decoded.
    pub invalid: u64,
}

enum Endpoint {
    Tcp(Socket),
    Udp(Connection),
}

pub struct Server {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    settings: ConnectionSettings,
    reporter: Arc<LogReporter>,
}

impl Server {
    /// Bind the configured address. Port 0 picks a free port, see
    /// [`Server::local_addr`].
    pub fn bind(config: &Config) -> io::Result<Self> {
        let addr = parse_addr(&config.address)?;
        let settings = ConnectionSettings::from_config(config);
        let reporter = Arc::new(LogReporter::new());

        let (endpoint, local_addr) = match config.protocol {
            Protocol::Tcp => {
                let listener = create_listener(addr)?;
                let local_addr = listener.local_addr()?;
                (Endpoint::Tcp(listener), local_addr)
            }
            Protocol::Udp => {
                let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None)?;
                socket.set_reuse_address(true)?;
                socket.bind(&addr.into())?;
                let local_addr = socket.local_addr()?;
                let reporter: Arc<dyn ErrorReporter> = reporter.clone();
                let conn = Connection::open(socket, &settings, true, reporter)?;
                (Endpoint::Udp(conn), local_addr)
            }
        };
        let local_addr = local_addr.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "not an inet socket")
        })?;

        Ok(Self {
            endpoint,
            local_addr,
            settings,
            reporter,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `stop` is set. Returns the final counters.
    pub fn run(self, stop: &AtomicBool) -> io::Result<ServerStats> {
        let Server {
            endpoint,
            local_addr,
            settings,
            reporter,
        } = self;

        let mut poll = Poll::new()?;
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        let mut stats = ServerStats::default();

        info!(
            addr = %local_addr,
            strategy = ?settings.strategy,
            max_message_size = settings.shape.max_message_size(),
            "Server listening"
        );

        match endpoint {
            Endpoint::Tcp(listener) => {
                let fd = listener.as_raw_fd();
                poll.registry()
                    .register(&mut SourceFd(&fd), SOCKET_TOKEN, Interest::READABLE)?;
                let mut connections = ConnectionRegistry::new(MAX_CONNECTIONS);
                let conn_reporter: Arc<dyn ErrorReporter> = reporter.clone();

                while !stop.load(Ordering::Relaxed) {
                    if !wait(&mut poll, &mut events)? {
                        continue;
                    }
                    for event in events.iter() {
                        match event.token() {
                            SOCKET_TOKEN => accept_connections(
                                &listener,
                                &mut poll,
                                &mut connections,
                                &settings,
                                &conn_reporter,
                                &mut stats,
                            )?,
                            Token(conn_id) => {
                                let Some(conn) = connections.get_mut(conn_id) else {
                                    continue;
                                };
                                if drain(conn, &mut stats) == Drained::Closed {
                                    close_connection(&mut poll, &mut connections, conn_id);
                                    stats.closed += 1;
                                }
                            }
                        }
                    }
                }
            }
            Endpoint::Udp(mut conn) => {
                let fd = conn.fd();
                poll.registry()
                    .register(&mut SourceFd(&fd), SOCKET_TOKEN, Interest::READABLE)?;

                while !stop.load(Ordering::Relaxed) {
                    if !wait(&mut poll, &mut events)? {
                        continue;
                    }
                    if events.iter().any(|e| e.token() == SOCKET_TOKEN) {
                        drain_datagrams(&mut conn, &mut stats);
                    }
                }
            }
        }

        info!(
            accepted = stats.accepted,
            messages = stats.messages,
            echoed = stats.echoed,
            skipped = stats.skipped,
            invalid = stats.invalid,
            failures = reporter.failures(),
            "Server stopped"
        );
        Ok(stats)
    }
}

/// Poll once; `false` when woken by a signal.
fn wait(poll: &mut Poll, events: &mut Events) -> io::Result<bool> {
    match poll.poll(events, Some(POLL_TIMEOUT)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
        Err(e) => Err(e),
    }
}

fn accept_connections(
    listener: &Socket,
    poll: &mut Poll,
    connections: &mut ConnectionRegistry,
    settings: &ConnectionSettings,
    reporter: &Arc<dyn ErrorReporter>,
    stats: &mut ServerStats,
) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((socket, peer_addr)) => {
                let peer = peer_addr.as_socket();
                if let Err(e) = socket.set_nodelay(true) {
                    debug!(error = %e, "Could not disable Nagle");
                }
                let conn = match Connection::open(socket, settings, true, reporter.clone()) {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Rejecting connection");
                        continue;
                    }
                };
                let fd = conn.fd();
                let conn_id = match connections.insert(conn) {
                    Ok(id) => id,
                    Err(_) => {
                        warn!("Connection limit reached");
                        continue;
                    }
                };
                poll.registry()
                    .register(&mut SourceFd(&fd), Token(conn_id), Interest::READABLE)?;
                stats.accepted += 1;
                debug!(conn_id, fd, peer = ?peer, "Accepted connection");
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Accept error: {}", e);
                break;
            }
        }
    }
    Ok(())
}

fn close_connection(poll: &mut Poll, connections: &mut ConnectionRegistry, conn_id: usize) {
    if let Some(conn) = connections.remove(conn_id) {
        let fd = conn.fd();
        let _ = poll.registry().deregister(&mut SourceFd(&fd));
        debug!(conn_id, fd, "Connection closed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drained {
    Open,
    Closed,
}

/// Read a stream connection until the kernel has no more data for it.
fn drain(conn: &mut Connection, stats: &mut ServerStats) -> Drained {
    let shape = *conn.shape();
    loop {
        let mut peer_gone = false;
        let received = conn.receive(&mut |desc: &mut Descriptor, peer, msg: &[u8]| {
            let keep_going = echo(desc, peer, msg, &shape, stats);
            peer_gone = !keep_going;
            keep_going
        });

        match received.outcome {
            TransferOutcome::Complete if peer_gone => return Drained::Closed,
            TransferOutcome::Complete | TransferOutcome::Interrupted => continue,
            TransferOutcome::WouldBlockPartial => return Drained::Open,
            TransferOutcome::ShutdownByPeer => {
                debug!(fd = conn.fd(), "Peer closed connection");
                return Drained::Closed;
            }
            // Already reported
            TransferOutcome::Fatal(_) => return Drained::Closed,
        }
    }
}

/// Read the UDP socket until it is empty. Nothing here ends the server:
/// a bad datagram only costs the bytes buffered with it.
fn drain_datagrams(conn: &mut Connection, stats: &mut ServerStats) {
    let shape = *conn.shape();
    loop {
        let received = conn.receive(&mut |desc: &mut Descriptor, peer, msg: &[u8]| {
            echo(desc, peer, msg, &shape, stats);
            true
        });

        match received.outcome {
            TransferOutcome::WouldBlockPartial => return,
            TransferOutcome::Fatal(_) => conn.reset(),
            // A message never spans datagrams
            TransferOutcome::Complete => {
                if conn.state() != FrameState::AwaitingHeader {
                    debug!(
                        fd = conn.fd(),
                        peer = ?received.peer,
                        state = ?conn.state(),
                        "Dropping partial datagram"
                    );
                }
                conn.reset();
            }
            // Empty datagram
            TransferOutcome::ShutdownByPeer | TransferOutcome::Interrupted => {}
        }
    }
}

/// Echo one message if it asks for it. `false` means the peer is gone.
fn echo(
    desc: &mut Descriptor,
    peer: Option<PeerAddress>,
    msg: &[u8],
    shape: &MessageShape,
    stats: &mut ServerStats,
) -> bool {
    stats.messages += 1;

    let header = match MessageHeader::decode(msg, shape) {
        Ok(header) => header,
        Err(e) => {
            stats.invalid += 1;
            debug!(fd = desc.fd(), error = %e, "Undecodable message");
            return true;
        }
    };
    if !header.has_flag(flags::PONG_REQUEST) {
        return true;
    }

    let sent = send_message(desc, msg, peer.as_ref());
    match sent.outcome {
        TransferOutcome::Complete => {
            stats.echoed += 1;
            true
        }
        // Nothing left the socket; signals are retried by `send_message`
        TransferOutcome::WouldBlockPartial | TransferOutcome::Interrupted => {
            stats.skipped += 1;
            true
        }
        TransferOutcome::ShutdownByPeer | TransferOutcome::Fatal(_) => false,
    }
}

fn parse_addr(address: &str) -> io::Result<SocketAddr> {
    address
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Create a non-blocking TCP listener.
fn create_listener(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(
        Domain::for_address(addr),
        Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket)
}
