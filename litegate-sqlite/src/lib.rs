//! # litegate-sqlite
//!
//! SQLite permission store for litegate.
//!
//! [`SqliteStore`] owns one `rusqlite::Connection`. It is synchronous; the
//! server wraps it in a `SharedStore`, which runs every call on the blocking
//! pool under a mutex.
//!
//! Credential digests live in `REMOTE_ACCESS_KEYS(key TEXT)`. While protected,
//! three triggers abort any insert, update or delete on that table, so the
//! statements clients send cannot mint or remove credentials.
//!
//! # Example
//!
//! ```rust,ignore
//! use litegate_core::PermissionStore;
//! use litegate_sqlite::SqliteStore;
//!
//! let mut store = SqliteStore::open("./server.db")?;
//! store.ensure_schema()?;
//! store.protect()?;
//! ```

use std::path::Path;
use std::time::Duration;

use litegate_core::{ErrorKind, Map, PermissionStore, Row, StoreError, StoreResult, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Statement};

mod error;

pub use error::{classify, to_store_error};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS REMOTE_ACCESS_KEYS (key TEXT);";

const CREATE_TRIGGERS: &str = "
    CREATE TRIGGER IF NOT EXISTS update_keys
        BEFORE UPDATE OF key ON REMOTE_ACCESS_KEYS
    BEGIN
        SELECT RAISE(ABORT, 'trying to update access key(s)!');
    END;
    CREATE TRIGGER IF NOT EXISTS insert_keys
        BEFORE INSERT ON REMOTE_ACCESS_KEYS
    BEGIN
        SELECT RAISE(ABORT, 'trying to insert access keys(s)!');
    END;
    CREATE TRIGGER IF NOT EXISTS delete_keys
        BEFORE DELETE ON REMOTE_ACCESS_KEYS
    BEGIN
        SELECT RAISE(ABORT, 'trying to delete acccess keys(s)!');
    END;";

const DROP_TRIGGERS: &str = "
    DROP TRIGGER IF EXISTS update_keys;
    DROP TRIGGER IF EXISTS insert_keys;
    DROP TRIGGER IF EXISTS delete_keys;";

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// SQLite-backed [`PermissionStore`]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(to_store_error)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(to_store_error)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(to_store_error)?;
        Ok(Self { conn })
    }

    /// Rolls back a transaction a statement left open
    fn rollback_open_transaction(&self) {
        if !self.conn.is_autocommit() {
            if let Err(_e) = self.conn.execute_batch("ROLLBACK") {
                #[cfg(feature = "tracing")]
                tracing::warn!("SQLite: rollback after failed statement failed: {}", _e);
            }
        }
    }
}

impl PermissionStore for SqliteStore {
    fn ensure_schema(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(CREATE_SCHEMA).map_err(to_store_error)
    }

    fn protect(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(CREATE_TRIGGERS).map_err(to_store_error)
    }

    fn unprotect(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(DROP_TRIGGERS).map_err(to_store_error)
    }

    fn is_protected(&mut self) -> StoreResult<bool> {
        let installed: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'trigger'
                   AND tbl_name = 'REMOTE_ACCESS_KEYS' COLLATE NOCASE
                   AND name IN ('update_keys', 'insert_keys', 'delete_keys')",
                [],
                |row| row.get(0),
            )
            .map_err(to_store_error)?;
        Ok(installed == 3)
    }

    fn execute(
        &mut self,
        statement: &str,
        positional_args: &[Value],
        keyword_args: &Map,
    ) -> StoreResult<Vec<Row>> {
        let result = run_statement(&self.conn, statement, positional_args, keyword_args);
        match result {
            Ok(rows) => {
                if !self.conn.is_autocommit() {
                    if let Err(e) = self.conn.execute_batch("COMMIT") {
                        self.rollback_open_transaction();
                        return Err(to_store_error(e));
                    }
                }
                Ok(rows)
            }
            Err(e) => {
                self.rollback_open_transaction();
                Err(e)
            }
        }
    }

    fn credential_exists(&mut self, digest: &str) -> StoreResult<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM REMOTE_ACCESS_KEYS WHERE key = ?1 LIMIT 1",
                params![digest],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
            .map_err(to_store_error)
    }

    fn credential_count(&mut self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM REMOTE_ACCESS_KEYS", [], |row| row.get(0))
            .map_err(to_store_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn list_credentials(&mut self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM REMOTE_ACCESS_KEYS ORDER BY rowid")
            .map_err(to_store_error)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))
            .map_err(to_store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_store_error)?;
        Ok(keys.into_iter().flatten().collect())
    }

    fn insert_credential(&mut self, digest: &str) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO REMOTE_ACCESS_KEYS (key) VALUES (?1)",
                params![digest],
            )
            .map(|_| ())
            .map_err(to_store_error)
    }

    fn remove_credential(&mut self, digest: &str) -> StoreResult<bool> {
        self.conn
            .execute(
                "DELETE FROM REMOTE_ACCESS_KEYS WHERE key = ?1",
                params![digest],
            )
            .map(|removed| removed > 0)
            .map_err(to_store_error)
    }
}

// ---------------------------------------------------------------------------
// Statement execution
// ---------------------------------------------------------------------------

fn run_statement(
    conn: &Connection,
    statement: &str,
    positional_args: &[Value],
    keyword_args: &Map,
) -> StoreResult<Vec<Row>> {
    // SQLite prepares no statement for these.
    if is_blank(statement) {
        return match positional_args.len() {
            0 => Ok(Vec::new()),
            supplied => Err(binding_count_error(0, supplied)),
        };
    }

    let mut stmt = conn.prepare(statement).map_err(to_store_error)?;
    bind_parameters(&mut stmt, positional_args, keyword_args)?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();

    while let Some(row) = rows.next().map_err(to_store_error)? {
        let mut record = Row::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            // On duplicate column names the first column wins.
            if record.contains_key(name) {
                continue;
            }
            let value = row.get_ref(idx).map_err(to_store_error)?;
            record.insert(name.as_str(), from_sql(value, name)?);
        }
        out.push(record);
    }

    Ok(out)
}

/// True when the text holds only whitespace, `;` and comments
fn is_blank(statement: &str) -> bool {
    let mut rest = statement;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            // An unterminated block comment runs to the end of input
            rest = comment.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return rest.is_empty();
        }
    }
}

fn binding_count_error(used: usize, supplied: usize) -> StoreError {
    StoreError::new(
        ErrorKind::ProgrammingError,
        format!(
            "Incorrect number of bindings supplied. The current statement uses {used}, and there are {supplied} supplied."
        ),
    )
}

/// Binds positional and keyword arguments by placeholder kind
///
/// `?` and `?NNN` consume positional arguments in index order; `:name`,
/// `@name` and `$name` are looked up by `name` in `keyword_args`.
fn bind_parameters(
    stmt: &mut Statement<'_>,
    positional_args: &[Value],
    keyword_args: &Map,
) -> StoreResult<()> {
    let count = stmt.parameter_count();
    let mut slots = Vec::with_capacity(count);
    for idx in 1..=count {
        let name = stmt.parameter_name(idx).map(String::from);
        slots.push((idx, name));
    }

    let positional_slots = slots
        .iter()
        .filter(|(_, name)| keyword_name(name.as_deref()).is_none())
        .count();
    if positional_slots != positional_args.len() {
        return Err(binding_count_error(positional_slots, positional_args.len()));
    }

    let mut positional = positional_args.iter();
    for (idx, name) in &slots {
        let value = match keyword_name(name.as_deref()) {
            Some(key) => keyword_args.get(key).ok_or_else(|| {
                StoreError::new(
                    ErrorKind::ProgrammingError,
                    format!("You did not supply a value for binding parameter :{key}."),
                )
            })?,
            // Counted above, so the iterator cannot run dry.
            None => positional.next().unwrap_or(&Value::Null),
        };
        stmt.raw_bind_parameter(*idx, to_sql(value, *idx)?)
            .map_err(to_store_error)?;
    }

    Ok(())
}

fn keyword_name(name: Option<&str>) -> Option<&str> {
    let name = name?;
    match name.as_bytes().first() {
        Some(b':' | b'@' | b'$') => Some(&name[1..]),
        _ => None,
    }
}

fn to_sql(value: &Value, idx: usize) -> StoreResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Bytes(v) => SqlValue::Blob(v.clone()),
        Value::Sequence(_) | Value::Map(_) => {
            return Err(StoreError::new(
                ErrorKind::ProgrammingError,
                format!(
                    "Error binding parameter {idx}: type '{}' is not supported",
                    value.type_name()
                ),
            ))
        }
    })
}

fn from_sql(value: ValueRef<'_>, column: &str) -> StoreResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => {
                return Err(StoreError::new(
                    ErrorKind::OperationalError,
                    format!("Could not decode to UTF-8 column '{column}'"),
                ))
            }
        },
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use litegate_core::keys;

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store.protect().unwrap();
        store
    }

    fn run(store: &mut SqliteStore, sql: &str) -> StoreResult<Vec<Row>> {
        store.execute(sql, &[], &Map::new())
    }

    #[test]
    fn test_protection_toggle() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        assert!(!store.is_protected().unwrap());

        store.protect().unwrap();
        store.protect().unwrap();
        assert!(store.is_protected().unwrap());

        store.unprotect().unwrap();
        store.unprotect().unwrap();
        assert!(!store.is_protected().unwrap());
    }

    #[test]
    fn test_protected_table_rejects_writes() {
        let mut store = store();

        let err = store.insert_credential("abc").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IntegrityError);
        assert_eq!(err.message, "trying to insert access keys(s)!");

        keys::provision(&mut store).unwrap();
        let err = run(&mut store, "DELETE FROM REMOTE_ACCESS_KEYS").unwrap_err();
        assert_eq!(err.kind, ErrorKind::IntegrityError);
        assert_eq!(err.message, "trying to delete acccess keys(s)!");

        let err = run(&mut store, "UPDATE REMOTE_ACCESS_KEYS SET key = 'x'").unwrap_err();
        assert_eq!(err.message, "trying to update access key(s)!");

        assert_eq!(store.credential_count().unwrap(), 1);
    }

    #[test]
    fn test_credentials_lifecycle() {
        let mut store = store();
        assert_eq!(store.credential_count().unwrap(), 0);

        let first = keys::provision(&mut store).unwrap();
        let second = keys::provision(&mut store).unwrap();
        assert!(store.is_protected().unwrap());
        assert_eq!(store.credential_count().unwrap(), 2);
        assert!(store.credential_exists(&first.digest()).unwrap());
        assert!(!store.credential_exists(first.as_str()).unwrap());
        assert_eq!(
            store.list_credentials().unwrap(),
            vec![first.digest(), second.digest()]
        );

        assert!(keys::revoke(&mut store, &first.digest()).unwrap());
        assert!(!keys::revoke(&mut store, &first.digest()).unwrap());
        assert_eq!(store.list_credentials().unwrap(), vec![second.digest()]);
        assert!(store.is_protected().unwrap());
    }

    #[test]
    fn test_select_rows_in_column_order() {
        let mut store = store();
        let rows = run(&mut store, "SELECT 1 AS x, 'a' AS y, NULL AS z, 2.5 AS w, x'00ff' AS b").unwrap();
        assert_eq!(
            rows,
            vec![Row::new()
                .with("x", 1)
                .with("y", "a")
                .with("z", Value::Null)
                .with("w", 2.5)
                .with("b", vec![0u8, 255])]
        );
    }

    #[test]
    fn test_duplicate_column_first_wins() {
        let mut store = store();
        let rows = run(&mut store, "SELECT 1 AS a, 2 AS a, 3 AS b").unwrap();
        assert_eq!(rows, vec![Row::new().with("a", 1).with("b", 3)]);
    }

    #[test]
    fn test_positional_and_keyword_binding() {
        let mut store = store();
        run(&mut store, "CREATE TABLE t (a INTEGER, b TEXT, c BLOB, d INTEGER)").unwrap();

        let rows = store
            .execute(
                "INSERT INTO t VALUES (?, :b, ?, @d) RETURNING *",
                &[Value::Integer(7), Value::Bytes(vec![1, 2])],
                &Map::new().with("b", "bee").with("d", true),
            )
            .unwrap();
        assert_eq!(
            rows,
            vec![Row::new()
                .with("a", 7)
                .with("b", "bee")
                .with("c", vec![1u8, 2])
                .with("d", 1)]
        );

        let rows = store
            .execute(
                "SELECT ?2 AS second, ?1 AS first, $x AS x",
                &[Value::from("one"), Value::from("two")],
                &Map::new().with("x", Value::Null),
            )
            .unwrap();
        assert_eq!(
            rows,
            vec![Row::new()
                .with("second", "two")
                .with("first", "one")
                .with("x", Value::Null)]
        );
    }

    #[test]
    fn test_binding_errors() {
        let mut store = store();

        let err = store
            .execute("SELECT ?, ?", &[Value::Integer(1)], &Map::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProgrammingError);
        assert_eq!(
            err.message,
            "Incorrect number of bindings supplied. The current statement uses 2, and there are 1 supplied."
        );

        let err = store.execute("SELECT :missing", &[], &Map::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProgrammingError);
        assert_eq!(
            err.message,
            "You did not supply a value for binding parameter :missing."
        );

        let err = store
            .execute("SELECT ?", &[Value::Sequence(vec![])], &Map::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProgrammingError);
        assert_eq!(
            err.message,
            "Error binding parameter 1: type 'sequence' is not supported"
        );
    }

    #[test]
    fn test_statement_errors_are_classified() {
        let mut store = store();
        let err = run(&mut store, "SELEC 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.message, "near \"SELEC\": syntax error");
        assert_eq!(
            run(&mut store, "SELECT * FROM missing").unwrap_err().kind,
            ErrorKind::OperationalError
        );
        assert_eq!(
            run(&mut store, "SELECT 1; SELECT 2").unwrap_err().kind,
            ErrorKind::ProgrammingError
        );
    }

    #[test]
    fn test_blank_statements_return_no_rows() {
        let mut store = store();
        for sql in ["", "   ", "-- c", ";", "/* note */ ;\n-- trailing", "/* open"] {
            assert_eq!(run(&mut store, sql).unwrap(), Vec::<Row>::new(), "{sql:?}");
        }

        let err = store.execute("-- c", &[Value::Integer(1)], &Map::new()).unwrap_err();
        assert_eq!(
            err.message,
            "Incorrect number of bindings supplied. The current statement uses 0, and there are 1 supplied."
        );

        assert!(!is_blank("-- c\nSELECT 1"));
        assert_eq!(
            run(&mut store, "-- leading\nSELECT 1 AS x").unwrap(),
            vec![Row::new().with("x", 1)]
        );
    }

    #[test]
    fn test_open_transaction_is_committed_or_rolled_back() {
        let mut store = store();
        run(&mut store, "CREATE TABLE t (a INTEGER NOT NULL)").unwrap();

        run(&mut store, "BEGIN").unwrap();
        assert!(store.conn.is_autocommit());

        run(&mut store, "INSERT INTO t VALUES (1)").unwrap();
        assert!(run(&mut store, "INSERT INTO t VALUES (NULL)").is_err());
        assert!(store.conn.is_autocommit());

        let rows = run(&mut store, "SELECT COUNT(*) AS n FROM t").unwrap();
        assert_eq!(rows, vec![Row::new().with("n", 1)]);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.db");

        let credential = {
            let mut store = SqliteStore::open(&path).unwrap();
            store.ensure_schema().unwrap();
            store.protect().unwrap();
            keys::provision(&mut store).unwrap()
        };

        let mut store = SqliteStore::open(&path).unwrap();
        assert!(store.is_protected().unwrap());
        assert!(store.credential_exists(&credential.digest()).unwrap());
    }
}
