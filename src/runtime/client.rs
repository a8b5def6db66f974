//! Ping-pong client.
//!
//! Sends one message at a time on a blocking socket and waits for its echo
//! before sending the next. A read that times out counts the message as
//! lost.

use super::connection::{Connection, ConnectionSettings};
use crate::config::{Config, Protocol};
use crate::message::{build_message, flags, MessageHeader, SequenceCounter};
use crate::transfer::{Descriptor, ErrorReporter, LogReporter, PeerAddress, TransferOutcome};
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Totals for one client run. Round-trip times cover only the messages
/// sent after warmup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sent: u64,
    pub received: u64,
    /// Sends the socket refused without taking any bytes.
    pub skipped: u64,
    /// Messages whose echo did not arrive within the reply timeout.
    pub lost: u64,
    pub min_rtt: Duration,
    pub avg_rtt: Duration,
    pub max_rtt: Duration,
}

#[derive(Debug, Default)]
struct RttStats {
    samples: u32,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl RttStats {
    fn record(&mut self, rtt: Duration) {
        self.samples += 1;
        self.total += rtt;
        self.min = Some(self.min.map_or(rtt, |min| min.min(rtt)));
        self.max = self.max.max(rtt);
    }

    fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples
        }
    }
}

enum Reply {
    Echoed(Duration),
    Lost,
    PeerGone,
}

/// Run the configured number of round trips against `config.address`.
pub fn run(config: &Config) -> io::Result<RunSummary> {
    let server: SocketAddr = config
        .address
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let settings = ConnectionSettings::from_config(config);
    let reporter = Arc::new(LogReporter::new());

    let (socket, dest) = match config.protocol {
        Protocol::Tcp => {
            let socket = Socket::new(
                Domain::for_address(server),
                Type::STREAM,
                Some(socket2::Protocol::TCP),
            )?;
            socket.connect(&server.into())?;
            socket.set_nodelay(true)?;
            (socket, None)
        }
        Protocol::Udp => {
            let socket = Socket::new(Domain::for_address(server), Type::DGRAM, None)?;
            socket.bind(&unspecified(server).into())?;
            (socket, Some(PeerAddress(server)))
        }
    };
    socket.set_read_timeout(Some(config.reply_timeout))?;

    let conn_reporter: Arc<dyn ErrorReporter> = reporter.clone();
    let mut conn = Connection::open(socket, &settings, false, conn_reporter)?;

    info!(
        server = %server,
        protocol = ?config.protocol,
        payload_size = config.payload_size,
        count = config.count,
        warmup = config.warmup,
        "Client started"
    );

    let mut sequences = SequenceCounter::new(&settings.shape);
    let mut summary = RunSummary::default();
    let mut rtt = RttStats::default();

    for i in 0..config.count {
        let warmup = i < config.warmup;
        let mut msg_flags = flags::CLIENT | flags::PONG_REQUEST;
        if warmup {
            msg_flags |= flags::WARMUP;
        }
        let sequence = sequences.next_sequence();
        let msg = build_message(msg_flags, sequence, config.payload_size);

        let start = Instant::now();
        let sent = conn.send(&msg, dest.as_ref());
        match sent.outcome {
            TransferOutcome::Complete => summary.sent += 1,
            // Nothing left the socket
            TransferOutcome::WouldBlockPartial | TransferOutcome::Interrupted => {
                summary.skipped += 1;
                continue;
            }
            TransferOutcome::ShutdownByPeer => {
                warn!(sequence, "Server closed the connection");
                break;
            }
            TransferOutcome::Fatal(err) => return Err(err.into()),
        }

        match await_echo(&mut conn, sequence, start)? {
            Reply::Echoed(elapsed) => {
                summary.received += 1;
                if !warmup {
                    rtt.record(elapsed);
                }
            }
            Reply::Lost => {
                summary.lost += 1;
                debug!(sequence, "Echo lost");
            }
            Reply::PeerGone => {
                warn!(sequence, "Server closed the connection");
                break;
            }
        }
    }

    summary.min_rtt = rtt.min.unwrap_or_default();
    summary.avg_rtt = rtt.average();
    summary.max_rtt = rtt.max;

    info!(
        sent = summary.sent,
        received = summary.received,
        skipped = summary.skipped,
        lost = summary.lost,
        min_rtt_us = summary.min_rtt.as_micros() as u64,
        avg_rtt_us = summary.avg_rtt.as_micros() as u64,
        max_rtt_us = summary.max_rtt.as_micros() as u64,
        failures = reporter.failures(),
        "Client finished"
    );
    Ok(summary)
}

/// Read until the echo of `sequence` arrives. Echoes of earlier, already
/// given-up messages are skipped.
fn await_echo(conn: &mut Connection, sequence: u64, start: Instant) -> io::Result<Reply> {
    let shape = *conn.shape();
    let mut echoed = None;

    loop {
        let received = conn.receive(&mut |_: &mut Descriptor, _, msg: &[u8]| {
            match MessageHeader::decode(msg, &shape) {
                Ok(header) if header.sequence == sequence => {
                    echoed = Some(start.elapsed());
                    true
                }
                Ok(header) => {
                    debug!(expected = sequence, got = header.sequence, "Stale echo");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Undecodable echo");
                    true
                }
            }
        });

        match received.outcome {
            TransferOutcome::Complete | TransferOutcome::Interrupted => {
                if let Some(elapsed) = echoed {
                    return Ok(Reply::Echoed(elapsed));
                }
            }
            // Read timeout
            TransferOutcome::WouldBlockPartial => return Ok(Reply::Lost),
            TransferOutcome::ShutdownByPeer => return Ok(Reply::PeerGone),
            TransferOutcome::Fatal(err) => return Err(err.into()),
        }
    }
}

fn unspecified(peer: SocketAddr) -> SocketAddr {
    let ip = match peer {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}
