//! TCP listener and connection dispatch
//!
//! Accepts connections on the configured address and spawns one task per
//! connection running a [`Session`] against the shared store. Sessions never
//! talk to each other; the only shared state is the store and the live
//! connection counter.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{GateError, GateResult};
use crate::session::Session;
use crate::store::{PermissionStore, SharedStore};

/// Decrements the live counter when a session task ends, however it ends
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
    #[allow(dead_code)] // read only with tracing
    peer: SocketAddr,
}

impl ConnectionGuard {
    fn register(active: &Arc<AtomicUsize>, peer: SocketAddr) -> Self {
        let _count = active.fetch_add(1, Ordering::SeqCst) + 1;

        #[cfg(feature = "tracing")]
        tracing::info!("Connection made to {}. {} active", peer, _count);

        Self {
            active: Arc::clone(active),
            peer,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _count = self.active.fetch_sub(1, Ordering::SeqCst) - 1;

        #[cfg(feature = "tracing")]
        tracing::info!("Connection lost to {}. {} active", self.peer, _count);
    }
}

/// The listening server
pub struct Server<S> {
    listener: TcpListener,
    store: SharedStore<S>,
    config: ServerConfig,
    active: Arc<AtomicUsize>,
}

impl<S: PermissionStore> Server<S> {
    /// Binds the configured address
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn bind(config: ServerConfig, store: SharedStore<S>) -> GateResult<Self> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| GateError::io(format!("Failed to bind {}", config.bind_addr), e))?;

        #[cfg(feature = "tracing")]
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Listening on {}", addr);
        }

        Ok(Self {
            listener,
            store,
            config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> GateResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| GateError::io("Failed to read local address", e))
    }

    /// Handle to the live connection counter
    pub fn active_connections(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }

    /// Serves until the process ends
    pub async fn run(self) -> GateResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes
    ///
    /// Stops accepting once `shutdown` resolves. Sessions already running are
    /// left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> GateResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        "Shutting down listener, {} connections still active",
                        self.active.load(Ordering::SeqCst)
                    );
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.dispatch(stream, peer),
                        Err(_e) => {
                            #[cfg(feature = "tracing")]
                            tracing::error!("Failed to accept connection: {}", _e);
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let guard = ConnectionGuard::register(&self.active, peer);
        let session = Session::new(self.store.clone(), &self.config).with_peer(peer.to_string());

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(_e) = session.run(stream).await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Session with {} failed: {}", peer, _e);
            }
        });
    }
}
