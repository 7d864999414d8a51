//! Server configuration

/// Default TCP port
pub const DEFAULT_PORT: u16 = 6767;

/// Default upper bound on a single frame, delimiter included
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Configuration for the listener and its sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, as `host:port`
    pub bind_addr: String,

    /// Longest accepted frame in bytes; longer frames close the connection
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    /// # Defaults
    /// - Bind address: `0.0.0.0:6767`
    /// - Max frame length: 64 MiB
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Joins host and port, bracketing bare IPv6 literals
pub fn socket_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the full bind address
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Sets host and port separately
    pub fn host_port(self, host: &str, port: u16) -> Self {
        self.bind_addr(socket_addr(host, port))
    }

    /// Sets the maximum frame length
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }
}
