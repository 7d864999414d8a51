//! litegate core
//!
//! Serves one embedded SQL store to remote clients over an authenticated,
//! line-framed TCP protocol. This crate holds everything except the concrete
//! store: the wire codec, the statement validator, the store trait and its
//! shared handle, the executor, the per-connection session and the listener.
//!
//! # Example
//!
//! ```rust,ignore
//! use litegate_core::{Server, ServerConfig, SharedStore};
//! use litegate_sqlite::SqliteStore;
//!
//! let store = SharedStore::new(SqliteStore::open("server.db")?);
//! store.with_blocking(|s| { s.ensure_schema()?; s.protect() })?;
//! Server::bind(ServerConfig::default(), store).await?.run().await?;
//! ```

pub mod config;
mod error;
pub mod executor;
pub mod keys;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;
pub mod validator;
pub mod value;

pub use config::ServerConfig;
pub use error::{
    CodecError, CodecResult, ErrorKind, GateError, GateResult, StoreError, StoreResult,
    UnknownErrorKind,
};
pub use keys::Credential;
pub use protocol::{Request, Response};
pub use server::Server;
pub use session::{Session, SessionState};
pub use store::{AuthOutcome, PermissionStore, SharedStore};
pub use validator::{validate, Verdict};
pub use value::{Map, Row, Value};
