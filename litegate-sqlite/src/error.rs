//! Classification of SQLite failures into wire error kinds

use litegate_core::{ErrorKind, StoreError};
use rusqlite::ErrorCode;

/// Maps an engine error to the kind clients see
pub fn classify(err: &rusqlite::Error) -> ErrorKind {
    use rusqlite::Error as E;

    match err {
        E::SqliteFailure(failure, message) => classify_engine(failure.code, message.as_deref()),
        // Parse failures from `prepare` carry the input and offset separately
        E::SqlInputError { error, msg, .. } => classify_engine(error.code, Some(msg)),
        E::InvalidParameterCount(..)
        | E::InvalidParameterName(..)
        | E::MultipleStatement
        | E::InvalidColumnIndex(..)
        | E::InvalidColumnName(..) => ErrorKind::ProgrammingError,
        E::Utf8Error(..)
        | E::NulError(..)
        | E::IntegralValueOutOfRange(..)
        | E::FromSqlConversionFailure(..)
        | E::InvalidColumnType(..) => ErrorKind::DataError,
        _ => ErrorKind::DatabaseError,
    }
}

fn classify_engine(code: ErrorCode, message: Option<&str>) -> ErrorKind {
    match code {
        ErrorCode::ConstraintViolation => ErrorKind::IntegrityError,
        ErrorCode::Unknown if mentions_syntax(message) => ErrorKind::SyntaxError,
        ErrorCode::TypeMismatch | ErrorCode::TooBig => ErrorKind::DataError,
        ErrorCode::ApiMisuse => ErrorKind::InterfaceError,
        ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => ErrorKind::DatabaseError,
        _ => ErrorKind::OperationalError,
    }
}

fn mentions_syntax(message: Option<&str>) -> bool {
    message.is_some_and(|m| m.contains("syntax error") || m.contains("incomplete input"))
}

/// Converts an engine error, keeping the engine's own message
pub fn to_store_error(err: rusqlite::Error) -> StoreError {
    let kind = classify(&err);
    let message = match &err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        rusqlite::Error::SqlInputError { msg, .. } => msg.clone(),
        other => other.to_string(),
    };
    StoreError::new(kind, message)
}
