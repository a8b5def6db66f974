//! Classified result of a single I/O attempt.

use std::fmt;
use std::io;

/// How an I/O attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All requested bytes moved (send) or some bytes arrived (receive).
    Complete,
    /// Peer closed or reset the connection. End of stream, not a failure.
    ShutdownByPeer,
    /// Non-blocking mode and nothing moved this call; retry when ready.
    WouldBlockPartial,
    /// A signal interrupted the call before any data moved.
    Interrupted,
    /// Unrecoverable for this descriptor.
    Fatal(FatalError),
}

impl TransferOutcome {
    /// Transient outcomes leave the descriptor usable.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WouldBlockPartial | Self::Interrupted)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// The error behind a [`TransferOutcome::Fatal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatalError {
    pub kind: io::ErrorKind,
    /// OS error code, when the failure came from a syscall.
    pub code: Option<i32>,
}

impl FatalError {
    pub fn new(kind: io::ErrorKind) -> Self {
        Self { kind, code: None }
    }
}

impl From<&io::Error> for FatalError {
    fn from(err: &io::Error) -> Self {
        Self {
            kind: err.kind(),
            code: err.raw_os_error(),
        }
    }
}

impl From<FatalError> for io::Error {
    fn from(err: FatalError) -> Self {
        match err.code {
            Some(code) => io::Error::from_raw_os_error(code),
            None => io::Error::from(err.kind),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (os error {code})", io::Error::from_raw_os_error(code)),
            None => write!(f, "{}", io::Error::from(self.kind)),
        }
    }
}

/// Outcome of a whole engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub bytes: usize,
    pub outcome: TransferOutcome,
}

impl Transfer {
    pub fn new(bytes: usize, outcome: TransferOutcome) -> Self {
        Self { bytes, outcome }
    }
}

/// Map one raw transport result onto the outcome taxonomy.
///
/// Shared by every transport so raw and encrypted sockets classify alike.
pub fn classify(result: &io::Result<usize>) -> TransferOutcome {
    match result {
        Ok(0) => TransferOutcome::ShutdownByPeer,
        Ok(_) => TransferOutcome::Complete,
        Err(err) => classify_error(err),
    }
}

pub(crate) fn classify_error(err: &io::Error) -> TransferOutcome {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => TransferOutcome::ShutdownByPeer,
        io::ErrorKind::WouldBlock => TransferOutcome::WouldBlockPartial,
        io::ErrorKind::Interrupted => TransferOutcome::Interrupted,
        _ => TransferOutcome::Fatal(FatalError::from(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(&Ok(10)), TransferOutcome::Complete);
        assert_eq!(classify(&Ok(0)), TransferOutcome::ShutdownByPeer);
        assert_eq!(
            classify(&Err(io::Error::from(io::ErrorKind::ConnectionReset))),
            TransferOutcome::ShutdownByPeer
        );
        assert_eq!(
            classify(&Err(io::Error::from_raw_os_error(libc::EPIPE))),
            TransferOutcome::ShutdownByPeer
        );
        assert_eq!(
            classify(&Err(io::Error::from_raw_os_error(libc::EAGAIN))),
            TransferOutcome::WouldBlockPartial
        );
        assert_eq!(
            classify(&Err(io::Error::from_raw_os_error(libc::EINTR))),
            TransferOutcome::Interrupted
        );

        let fatal = classify(&Err(io::Error::from_raw_os_error(libc::EBADF)));
        match fatal {
            TransferOutcome::Fatal(err) => assert_eq!(err.code, Some(libc::EBADF)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(fatal.is_fatal());
        assert!(!fatal.is_transient());
    }

    #[test]
    fn test_fatal_error_converts_back() {
        let fatal = FatalError::from(&io::Error::from_raw_os_error(libc::EBADF));
        assert_eq!(io::Error::from(fatal).raw_os_error(), Some(libc::EBADF));

        let framing = FatalError::new(io::ErrorKind::InvalidData);
        assert_eq!(io::Error::from(framing).kind(), io::ErrorKind::InvalidData);
    }
}
