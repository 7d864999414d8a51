//! litegate CLI - serve a SQLite file over the network and manage its access keys
//!
//! `run` starts the server, `keygen`/`keys`/`revoke` manage access keys
//! directly in the database file, and `query` executes a statement against a
//! running server.

use clap::{Parser, Subcommand};
use commands::{
    keys::{KeygenCommand, KeysCommand, RevokeCommand},
    query::QueryCommand,
    server::RunCommand,
};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

/// litegate - authenticated network access to a SQLite database
#[derive(Debug, Parser)]
#[command(name = "litegate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve a database until interrupted
    #[command(name = "run")]
    Run(RunCommand),

    /// Create an access key and print it
    #[command(name = "keygen")]
    Keygen(KeygenCommand),

    /// List stored access key digests
    #[command(name = "keys")]
    Keys(KeysCommand),

    /// Remove an access key by digest
    #[command(name = "revoke")]
    Revoke(RevokeCommand),

    /// Execute a statement on a running server
    #[command(name = "query")]
    Query(QueryCommand),
}

/// Logs go to stderr so `keygen` output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Run(cmd) => cmd.execute().await,
        Command::Keygen(cmd) => cmd.execute().await,
        Command::Keys(cmd) => cmd.execute().await,
        Command::Revoke(cmd) => cmd.execute().await,
        Command::Query(cmd) => cmd.execute().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
