//! Statement validator
//!
//! Rejects statements that would remove or replace the protection on the
//! credential table before they reach the store. The check is a textual
//! pattern match, case-insensitive and tolerant of whitespace, quoting and
//! schema qualification. It does not parse SQL: anything that disables
//! protection by other means is the store's concern.
//!
//! Rejected forms:
//!
//! - `CREATE [TEMP|TEMPORARY] TRIGGER [IF NOT EXISTS] [schema.]{update,insert,delete}_keys`
//! - `DROP TRIGGER [IF EXISTS] [schema.]{update,insert,delete}_keys`
//! - `DROP TABLE [IF EXISTS] [schema.]REMOTE_ACCESS_KEYS`

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ErrorKind, StoreError};

/// Name of the table holding credential digests
pub const CREDENTIAL_TABLE: &str = "REMOTE_ACCESS_KEYS";

/// Names of the triggers that protect [`CREDENTIAL_TABLE`]
pub const PROTECTION_TRIGGERS: [&str; 3] = ["update_keys", "insert_keys", "delete_keys"];

/// Reason returned for every rejected statement
pub const REJECTION_REASON: &str = "Statement would alter protection of REMOTE_ACCESS_KEYS.";

// An identifier optionally wrapped in one of SQLite's quote styles.
const Q_OPEN: &str = r#"["`\[]?"#;
const Q_CLOSE: &str = r#"["`\]]?"#;

fn trigger_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r"(?i)\b(?:create\s+(?:temp(?:orary)?\s+)?trigger\s+(?:if\s+not\s+exists\s+)?|drop\s+trigger\s+(?:if\s+exists\s+)?){q}(?:\w+{c}\s*\.\s*{q})?(?:update|insert|delete)_keys{c}(?:\W|$)",
            q = Q_OPEN,
            c = Q_CLOSE,
        );
        Regex::new(&pattern).unwrap_or_else(|e| unreachable!("trigger pattern: {e}"))
    })
}

fn table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r"(?i)\bdrop\s+table\s+(?:if\s+exists\s+)?{q}(?:\w+{c}\s*\.\s*{q})?remote_access_keys{c}(?:\W|$)",
            q = Q_OPEN,
            c = Q_CLOSE,
        );
        Regex::new(&pattern).unwrap_or_else(|e| unreachable!("table pattern: {e}"))
    })
}

/// Outcome of [`validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(&'static str),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    /// Converts a rejection into the error returned to the client
    pub fn into_result(self) -> Result<(), StoreError> {
        match self {
            Verdict::Accept => Ok(()),
            Verdict::Reject(reason) => Err(StoreError::new(ErrorKind::IntegrityError, reason)),
        }
    }
}

/// Checks whether a statement may be forwarded to the store
///
/// Every other statement is accepted, including ones the store will reject.
pub fn validate(statement: &str) -> Verdict {
    if trigger_pattern().is_match(statement) || table_pattern().is_match(statement) {
        Verdict::Reject(REJECTION_REASON)
    } else {
        Verdict::Accept
    }
}
