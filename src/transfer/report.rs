//! Error-reporting collaborator.
//!
//! Engines never decide to tear anything down: every `Fatal` outcome is
//! handed to an [`ErrorReporter`], and whoever owns the descriptor decides
//! what happens next.

use super::outcome::FatalError;
use super::transport::PeerAddress;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Which engine hit the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// Details of one fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    pub fd: RawFd,
    pub direction: Direction,
    /// Bytes the failing call was asked to move.
    pub bytes: usize,
    pub peer: Option<PeerAddress>,
    pub error: FatalError,
}

/// Receives every fatal failure on a descriptor.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, failure: &Failure);
}

/// Reporter that logs failures and keeps a count.
#[derive(Debug, Default)]
pub struct LogReporter {
    failures: AtomicU64,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failures reported so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl ErrorReporter for LogReporter {
    fn report(&self, failure: &Failure) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        match failure.peer {
            Some(peer) => error!(
                fd = failure.fd,
                direction = ?failure.direction,
                bytes = failure.bytes,
                peer = %peer,
                error = %failure.error,
                "Transfer failed"
            ),
            None => error!(
                fd = failure.fd,
                direction = ?failure.direction,
                bytes = failure.bytes,
                error = %failure.error,
                "Transfer failed"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Reporter that keeps every failure for inspection.
    #[derive(Debug, Default)]
    pub struct RecordingReporter {
        pub failures: Mutex<Vec<Failure>>,
    }

    impl RecordingReporter {
        pub fn taken(&self) -> Vec<Failure> {
            self.failures.lock().unwrap().clone()
        }
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, failure: &Failure) {
            self.failures.lock().unwrap().push(*failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_log_reporter_counts() {
        let reporter = LogReporter::new();
        let failure = Failure {
            fd: 7,
            direction: Direction::Send,
            bytes: 100,
            peer: Some(PeerAddress("127.0.0.1:9000".parse().unwrap())),
            error: FatalError::new(io::ErrorKind::Other),
        };
        reporter.report(&failure);
        reporter.report(&Failure {
            peer: None,
            ..failure
        });
        assert_eq!(reporter.failures(), 2);
    }
}
