//! Error handling for litegate
//!
//! Three layers of errors exist in the server:
//!
//! - [`CodecError`]: a frame could not be encoded or decoded.
//! - [`StoreError`]: the permission store rejected or failed an operation.
//!   Every store error carries an [`ErrorKind`] tag, which is what clients see
//!   on the wire next to the message text.
//! - [`GateError`]: anything that ends a connection or stops the listener
//!   (socket I/O, plus the two above when they cannot be answered in-band).
//!
//! # Error kinds
//!
//! [`ErrorKind`] is the stable taxonomy sent to clients as the first element
//! of a failure response. The tags are plain strings on the wire so that
//! clients written in other languages can discriminate on them:
//!
//! | Tag                | Raised for                                              |
//! |--------------------|---------------------------------------------------------|
//! | `BadRequest`       | frame did not decode into a request envelope            |
//! | `IntegrityError`   | validator rejection, failed login, constraint/trigger   |
//! | `ProgrammingError` | wrong binding count/name, unbindable value              |
//! | `OperationalError` | missing table, busy/locked database, I/O in the engine  |
//! | `SyntaxError`      | statement is not valid SQL                              |
//! | `DataError`        | value out of range or of the wrong type                 |
//! | `InterfaceError`   | engine API misuse                                       |
//! | `DatabaseError`    | corruption and anything unclassified                    |

use std::fmt;
use std::io;
use std::str::FromStr;

use thiserror::Error;

/// Stable failure classification surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    IntegrityError,
    ProgrammingError,
    OperationalError,
    SyntaxError,
    DataError,
    InterfaceError,
    DatabaseError,
}

impl ErrorKind {
    /// All known kinds, in declaration order
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::BadRequest,
        ErrorKind::IntegrityError,
        ErrorKind::ProgrammingError,
        ErrorKind::OperationalError,
        ErrorKind::SyntaxError,
        ErrorKind::DataError,
        ErrorKind::InterfaceError,
        ErrorKind::DatabaseError,
    ];

    /// Returns the wire tag for this kind
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::IntegrityError => "IntegrityError",
            ErrorKind::ProgrammingError => "ProgrammingError",
            ErrorKind::OperationalError => "OperationalError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::DataError => "DataError",
            ErrorKind::InterfaceError => "InterfaceError",
            ErrorKind::DatabaseError => "DatabaseError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire tag does not name a known [`ErrorKind`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown error kind: {0}")]
pub struct UnknownErrorKind(pub String);

impl FromStr for ErrorKind {
    type Err = UnknownErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownErrorKind(s.to_string()))
    }
}

/// Wire codec failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Payload could not be turned into the expected envelope
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Envelope could not be serialized
    #[error("Failed to encode envelope: {reason}")]
    Encode { reason: String },
}

impl CodecError {
    /// Create a malformed frame error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Create an encode error
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// A classified failure from the permission store
///
/// The message is the store's own text and is forwarded to clients unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for an unclassified [`ErrorKind::DatabaseError`]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseError, message)
    }
}

/// Result type for permission store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that terminate a session or the listener
#[derive(Debug, Error)]
pub enum GateError {
    /// Socket or listener I/O failure
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Socket or listener I/O failure with context
    #[error("I/O error: {context}: {source}")]
    IoWithContext {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl GateError {
    /// Create an I/O error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::IoWithContext {
            context: context.into(),
            source,
        }
    }

    /// Adds context to I/O errors; other variants are returned unchanged
    pub fn with_context(self, context: impl Into<String>) -> Self {
        match self {
            GateError::Io { source } => GateError::IoWithContext {
                context: context.into(),
                source,
            },
            GateError::IoWithContext {
                context: existing,
                source,
            } => GateError::IoWithContext {
                context: format!("{}: {}", context.into(), existing),
                source,
            },
            other => other,
        }
    }
}

/// Result type for session and server operations
pub type GateResult<T> = Result<T, GateError>;
