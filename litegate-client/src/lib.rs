//! litegate client library
//!
//! Async client for the litegate wire protocol: connect, authenticate with a
//! credential, then run statements and get rows back.
//!
//! ## Usage
//!
//! ```no_run
//! use litegate_client::{GateClient, Map, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = GateClient::connect("127.0.0.1:6767", Some("0123456789abcdef0123456789abcdef")).await?;
//!
//!     client.query("CREATE TABLE IF NOT EXISTS t (a INTEGER)").await?;
//!     client
//!         .execute("INSERT INTO t VALUES (?)", vec![Value::Integer(1)], Map::new())
//!         .await?;
//!
//!     let rows = client.query("SELECT a FROM t").await?;
//!     println!("Found {} rows", rows.len());
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;

// Re-export main types for convenience
pub use connection::GateClient;
pub use error::{ClientError, ClientResult};
pub use litegate_core::{ErrorKind, Map, Request, Row, Value};
