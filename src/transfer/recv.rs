//! Receive engine.

use super::descriptor::Descriptor;
use super::outcome::{FatalError, TransferOutcome};
use super::report::Direction;
use super::transport::PeerAddress;
use crate::framing::BufferWindow;
use std::io;
use tracing::trace;

/// Result of one [`receive_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub bytes: usize,
    pub outcome: TransferOutcome,
    /// Source of the data, for datagram transports.
    pub peer: Option<PeerAddress>,
}

/// Make exactly one read attempt into the window's free tail.
///
/// Never loops: the poller decides when the descriptor is worth reading
/// again. The window cursor is left untouched; whoever feeds the
/// accumulator advances it by `bytes`. Transient outcomes are returned
/// quietly, fatal ones are reported first.
pub fn receive_once(desc: &mut Descriptor, window: &mut BufferWindow<'_>) -> Received {
    let free = window.free_mut();
    let requested = free.len();

    if requested == 0 {
        let err = FatalError::new(io::ErrorKind::InvalidInput);
        desc.report(Direction::Receive, 0, None, err);
        return Received {
            bytes: 0,
            outcome: TransferOutcome::Fatal(err),
            peer: None,
        };
    }

    let (attempt, peer) = desc.transport_mut().read(free);

    trace!(
        fd = desc.fd(),
        requested,
        received = attempt.bytes,
        outcome = ?attempt.outcome,
        "receive attempt"
    );

    if let TransferOutcome::Fatal(err) = attempt.outcome {
        desc.report(Direction::Receive, requested, peer, err);
    }

    Received {
        bytes: attempt.bytes,
        outcome: attempt.outcome,
        peer,
    }
}
