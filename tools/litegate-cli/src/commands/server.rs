//! Server Command

use std::path::PathBuf;

use crate::commands::{open_store, resolve_db_path};
use crate::error::CliResult;
use clap::Args;
use litegate_core::config::DEFAULT_PORT;
use litegate_core::{PermissionStore, Server, ServerConfig, SharedStore};

/// Serve a database file until interrupted
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Database file (defaults to $HOME/server.db)
    pub db: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Largest accepted frame in bytes
    #[arg(long)]
    pub max_frame_len: Option<usize>,
}

impl RunCommand {
    pub async fn execute(self) -> CliResult<()> {
        let path = resolve_db_path(self.db)?;
        let mut store = open_store(&path)?;

        let credentials = store.credential_count()?;
        if credentials == 0 {
            tracing::warn!(
                "No access keys in {}: any client will be admitted until one is created with `litegate keygen`",
                path.display()
            );
        } else {
            tracing::info!("{} access keys loaded from {}", credentials, path.display());
        }

        let mut config = ServerConfig::new().host_port(&self.host, self.port);
        if let Some(len) = self.max_frame_len {
            config = config.max_frame_len(len);
        }

        let server = Server::bind(config, SharedStore::new(store)).await?;
        tracing::info!("Serving {} on {}", path.display(), server.local_addr()?);

        server
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Interrupted, shutting down");
            })
            .await?;

        Ok(())
    }
}
