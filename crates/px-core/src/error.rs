//! Core error types for proxyctl
//!
//! [`CallError`] is the taxonomy every controller call is classified into.
//! Transport failures are categorised by [`TransportErrorKind`] at the
//! transport boundary, so "backend not ready" is recognised from the I/O
//! error kind rather than from rendered OS error text.

use px_protocol::ProtocolError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the proxyctl ecosystem
#[derive(Error, Debug)]
pub enum PxError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Controller call error
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Category of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The backend endpoint does not exist yet (process still starting)
    NotReady,
    /// An established channel was severed
    Severed,
    /// The transport has been shut down
    Closed,
    /// The response could not be decoded
    Decode,
    /// Any other I/O failure
    Io,
}

/// Failure raised by a transport or while decoding a response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// Failure category
    pub kind: TransportErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl TransportError {
    /// Create a transport error of the given kind
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Backend endpoint missing
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotReady, message)
    }

    /// Channel severed
    pub fn severed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Severed, message)
    }

    /// Undecodable response
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }

    /// Classify an I/O error raised while connecting or writing
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::NotFound => TransportErrorKind::NotReady,
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => TransportErrorKind::Severed,
            _ => TransportErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => Self::from_io(&e),
            other => Self::decode(other.to_string()),
        }
    }
}

/// Classified outcome of a failed controller call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Input outside the accepted domain, detected locally
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Backend endpoint does not exist yet
    #[error("Backend not ready: {0}")]
    BackendNotReady(String),

    /// No matching response within the operation's timeout tier
    #[error("Operation timed out after {after:?}: {path}")]
    TimedOut { path: String, after: Duration },

    /// Backend answered with its success flag cleared
    #[error("{message}")]
    BackendRejected { status: u16, message: String },

    /// Send failed or the response could not be decoded
    #[error("Transport error: {0}")]
    Transport(TransportError),
}

impl CallError {
    /// Whether the generic retry path should attempt the call again
    ///
    /// Only transport failures qualify, and not once the channel has been
    /// closed for good. Readiness failures are left to the readiness probe,
    /// and timeouts have already consumed their budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transport(e) if e.kind != TransportErrorKind::Closed)
    }

    /// Whether this is the cold-start "endpoint missing" condition
    pub fn is_not_ready(&self) -> bool {
        matches!(self, CallError::BackendNotReady(_))
    }

    /// Text suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            CallError::Validation(reason) => reason.clone(),
            CallError::BackendRejected { message, .. } => message.clone(),
            CallError::TimedOut { .. } => {
                "Operation timed out; the core is temporarily unavailable, please retry".to_string()
            }
            CallError::Transport(_) => {
                "The core is temporarily unavailable, please retry".to_string()
            }
            CallError::BackendNotReady(_) => "The core has not finished starting".to_string(),
        }
    }
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        match err.kind {
            TransportErrorKind::NotReady => CallError::BackendNotReady(err.message),
            _ => CallError::Transport(err),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_classification_uses_error_kind() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "whatever the OS says");
        assert_eq!(
            TransportError::from_io(&refused).kind,
            TransportErrorKind::NotReady
        );

        let missing = io::Error::new(io::ErrorKind::NotFound, "pipe missing");
        assert_eq!(
            TransportError::from_io(&missing).kind,
            TransportErrorKind::NotReady
        );

        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "Connection refused");
        assert_eq!(
            TransportError::from_io(&broken).kind,
            TransportErrorKind::Severed
        );
    }

    #[test]
    fn test_not_ready_transport_maps_to_backend_not_ready() {
        let err: CallError = TransportError::not_ready("refused").into();
        assert!(err.is_not_ready());
        assert!(!err.is_retryable());

        let err: CallError = TransportError::severed("reset").into();
        assert!(err.is_retryable());

        let err: CallError = TransportError::new(TransportErrorKind::Closed, "shut down").into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_classification() {
        assert!(!CallError::Validation("x".into()).is_retryable());
        assert!(!CallError::BackendRejected {
            status: 400,
            message: "no".into()
        }
        .is_retryable());
        assert!(!CallError::TimedOut {
            path: "/configs".into(),
            after: Duration::from_secs(8)
        }
        .is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let rejected = CallError::BackendRejected {
            status: 400,
            message: "proxy not found".into(),
        };
        assert_eq!(rejected.user_message(), "proxy not found");

        let timed_out = CallError::TimedOut {
            path: "/proxies".into(),
            after: Duration::from_secs(15),
        };
        assert!(timed_out.user_message().contains("timed out"));

        let transport = CallError::Transport(TransportError::severed("eof"));
        assert!(transport.user_message().contains("retry"));
    }
}
