//! Error types for the litegate client library

use litegate_core::{CodecError, ErrorKind};
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server
    #[error("Connection failed to {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    /// Server closed the connection before replying
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Server answered with a known error kind
    #[error("{kind}: {message}")]
    Remote { kind: ErrorKind, message: String },

    /// Server answered with a kind this client does not know
    #[error("{kind}: {message}")]
    UnknownRemote { kind: String, message: String },

    /// Server sent a reply that does not fit the request
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Create a connection failed error
    pub fn connection_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Builds the error for a failure response, keeping unknown kinds as text
    pub fn remote(kind: String, message: String) -> Self {
        match kind.parse::<ErrorKind>() {
            Ok(kind) => Self::Remote { kind, message },
            Err(_) => Self::UnknownRemote { kind, message },
        }
    }

    /// Kind tag of a server-side failure, if this is one
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            Self::Remote { kind, .. } => Some(kind.as_str()),
            Self::UnknownRemote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
