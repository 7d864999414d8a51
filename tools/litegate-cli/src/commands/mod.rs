//! CLI Command Implementations
//!
//! This module contains the implementations for all CLI commands.

pub mod keys;
pub mod query;
pub mod server;

use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};
use litegate_core::PermissionStore;
use litegate_sqlite::SqliteStore;

/// File name used when no database path is given
const DEFAULT_DB_FILE: &str = "server.db";

/// `$HOME/server.db`
pub fn default_db_path() -> CliResult<PathBuf> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| anyhow::anyhow!("HOME is not set; pass a database path explicitly"))?;
    Ok(PathBuf::from(home).join(DEFAULT_DB_FILE))
}

/// Resolves an optional database argument
pub fn resolve_db_path(db: Option<PathBuf>) -> CliResult<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

/// Opens the store and makes sure the credential table and its protection exist
pub fn open_store(path: &Path) -> CliResult<SqliteStore> {
    let mut store = SqliteStore::open(path).map_err(|e| CliError::open_store(path, e))?;
    store
        .ensure_schema()
        .and_then(|()| store.protect())
        .map_err(|e| CliError::open_store(path, e))?;

    if !store.is_protected().map_err(|e| CliError::open_store(path, e))? {
        return Err(CliError::Unprotected {
            path: path.to_path_buf(),
        });
    }

    Ok(store)
}
