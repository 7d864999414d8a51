//! Access Key Commands
//!
//! Key management runs directly against the database file, never through
//! the wire protocol.

use std::path::PathBuf;

use crate::commands::{open_store, resolve_db_path};
use crate::error::CliResult;
use crate::output::{json, table, OutputFormat};
use clap::Args;
use litegate_core::{keys, PermissionStore};

/// Mint a new access key and print it once
#[derive(Debug, Args)]
pub struct KeygenCommand {
    /// Database file (defaults to $HOME/server.db)
    pub db: Option<PathBuf>,
}

impl KeygenCommand {
    pub async fn execute(self) -> CliResult<()> {
        let path = resolve_db_path(self.db)?;
        let mut store = open_store(&path)?;
        let credential = keys::provision(&mut store)?;

        // The plaintext is printed here and nowhere else.
        println!("{}", credential);
        Ok(())
    }
}

/// List stored key digests
#[derive(Debug, Args)]
pub struct KeysCommand {
    /// Database file (defaults to $HOME/server.db)
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl KeysCommand {
    pub async fn execute(self) -> CliResult<()> {
        let path = resolve_db_path(self.db)?;
        let mut store = open_store(&path)?;
        let digests = store.list_credentials()?;

        let output = match self.format {
            OutputFormat::Table => table::format_digests_table(&digests),
            OutputFormat::Json => json::format_json_pretty(&digests)?,
            OutputFormat::JsonCompact => json::format_json_compact(&digests)?,
        };

        println!("{}", output);
        Ok(())
    }
}

/// Remove a stored key digest
#[derive(Debug, Args)]
pub struct RevokeCommand {
    /// Database file followed by the digest, or just the digest
    #[arg(value_name = "DB")]
    pub first: String,

    /// Digest to remove, as printed by `litegate keys`
    #[arg(value_name = "DIGEST")]
    pub second: Option<String>,
}

impl RevokeCommand {
    /// Splits `[DB] DIGEST` into its parts
    fn target(self) -> (Option<PathBuf>, String) {
        match self.second {
            Some(digest) => (Some(PathBuf::from(self.first)), digest),
            None => (None, self.first),
        }
    }

    pub async fn execute(self) -> CliResult<()> {
        let (db, digest) = self.target();
        let path = resolve_db_path(db)?;
        let mut store = open_store(&path)?;

        if keys::revoke(&mut store, &digest)? {
            println!("Revoked {}", digest);
        } else {
            println!("No key with digest {}", digest);
        }
        Ok(())
    }
}
