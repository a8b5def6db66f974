//! Transmit engine.

use super::descriptor::Descriptor;
use super::outcome::{Transfer, TransferOutcome};
use super::report::Direction;
use super::transport::PeerAddress;
use tracing::{debug, trace};

/// Push all of `buf` onto the descriptor's transport.
///
/// Loops over partial writes until every byte is gone or a terminal
/// condition shows up:
/// - zero bytes / peer shutdown: `ShutdownByPeer`, no further attempts
/// - would-block with nothing sent yet this call: `WouldBlockPartial`
/// - would-block after partial progress: retried immediately
/// - signal: `Interrupted`, the caller may call again
/// - anything else: reported, then `Fatal`
///
/// `bytes` in the result counts what actually left during this call.
pub fn send_all(desc: &mut Descriptor, buf: &[u8], dest: Option<&PeerAddress>) -> Transfer {
    let mut sent = 0;

    while sent < buf.len() {
        let attempt = desc.transport_mut().write(&buf[sent..], dest);

        trace!(
            fd = desc.fd(),
            requested = buf.len() - sent,
            written = attempt.bytes,
            outcome = ?attempt.outcome,
            "send attempt"
        );

        match attempt.outcome {
            TransferOutcome::Complete => sent += attempt.bytes,
            TransferOutcome::ShutdownByPeer => {
                debug!(fd = desc.fd(), sent, "Peer shut down during send");
                return Transfer::new(sent, TransferOutcome::ShutdownByPeer);
            }
            TransferOutcome::WouldBlockPartial => {
                // Part of this message is already on the wire; don't strand the rest.
                if sent > 0 {
                    std::hint::spin_loop();
                    continue;
                }
                return Transfer::new(0, TransferOutcome::WouldBlockPartial);
            }
            TransferOutcome::Interrupted => {
                return Transfer::new(sent, TransferOutcome::Interrupted);
            }
            TransferOutcome::Fatal(err) => {
                desc.report(Direction::Send, buf.len() - sent, dest.copied(), err);
                return Transfer::new(sent, TransferOutcome::Fatal(err));
            }
        }
    }

    Transfer::new(sent, TransferOutcome::Complete)
}

/// Send one whole message, re-invoking [`send_all`] after a signal.
///
/// Once any byte of `buf` has left, the rest must follow or a stream peer
/// loses message boundaries, so would-block is also retried after progress.
/// The result is `WouldBlockPartial` only when nothing was sent.
pub fn send_message(desc: &mut Descriptor, buf: &[u8], dest: Option<&PeerAddress>) -> Transfer {
    let mut sent = 0;

    loop {
        let transfer = send_all(desc, &buf[sent..], dest);
        sent += transfer.bytes;

        match transfer.outcome {
            TransferOutcome::Interrupted => continue,
            TransferOutcome::WouldBlockPartial if sent > 0 => std::hint::spin_loop(),
            outcome => return Transfer::new(sent, outcome),
        }
    }
}
