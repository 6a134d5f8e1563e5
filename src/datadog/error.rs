//! Error types surfaced inside the delivery pipeline.
//!
//! None of these reach callers of
//! [`FemtoDatadogTransport::log`](super::FemtoDatadogTransport::log); the
//! worker classifies them to decide between dropping a record, tearing the
//! connection down, or scheduling a reconnect.

use std::io;

use thiserror::Error;

/// Failures raised while framing records or driving the socket.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The merged record could not be encoded as JSON.
    #[error("failed to serialise record: {0}")]
    Serialise(#[from] serde_json::Error),
    /// The framed record exceeds the configured size limit.
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },
    /// The peer stopped responding within the socket timeout.
    #[error("socket timed out")]
    Timeout,
    /// TLS setup failed, or the socket aborted the handshake.
    #[error(transparent)]
    Tls(#[from] native_tls::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the failure is a timeout rather than a hard error.
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Io(err) => is_timeout_kind(err.kind()),
            _ => false,
        }
    }
}

pub(crate) fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::timed_out(io::ErrorKind::TimedOut, true)]
    #[case::would_block(io::ErrorKind::WouldBlock, true)]
    #[case::reset(io::ErrorKind::ConnectionReset, false)]
    #[case::refused(io::ErrorKind::ConnectionRefused, false)]
    fn io_errors_classify_by_kind(#[case] kind: io::ErrorKind, #[case] timeout: bool) {
        let err = TransportError::from(io::Error::from(kind));
        assert_eq!(err.is_timeout(), timeout);
    }

    #[rstest]
    fn oversize_frames_are_not_timeouts() {
        let err = TransportError::FrameTooLarge { size: 10, limit: 5 };
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "frame of 10 bytes exceeds the 5 byte limit");
    }
}
