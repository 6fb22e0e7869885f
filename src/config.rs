//! Server configuration.

use std::time::Duration;

/// Port used when `PORT` is unset or not a valid port number.
pub const DEFAULT_PORT: u16 = 8080;

/// Bind address used when `RELAY_HOST` is unset.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default capacity of each connection's outbox.
const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Default upper bound on one inbound WebSocket message, in bytes.
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`RelayServer`](crate::server::RelayServer).
///
/// # Example
///
/// ```
/// use room_relay::config::RelayConfig;
/// use std::time::Duration;
///
/// let config = RelayConfig::default()
///     .with_port(9000)
///     .with_outbox_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.addr(), "0.0.0.0:9000");
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on.
    pub host: String,
    /// Port to listen on. `0` asks the OS for a free port.
    pub port: u16,
    /// Capacity of each connection's outbox.
    ///
    /// Events addressed to a connection whose outbox is full are dropped (with
    /// a warning logged) so one slow client never stalls a broadcast.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub outbox_capacity: usize,
    /// Largest inbound WebSocket message or frame accepted, in bytes.
    /// Defaults to **64 KiB**.
    pub max_frame_size: usize,
    /// How long [`RelayServer::shutdown`](crate::server::RelayServer::shutdown)
    /// waits for the accept loop and open sessions before aborting them.
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Build a configuration from the process environment.
    ///
    /// Reads `PORT` and `RELAY_HOST`; everything else keeps its default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// A `PORT` value that is missing or does not parse as a port number falls
    /// back to [`DEFAULT_PORT`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => config.port = port,
                Err(e) => {
                    tracing::warn!(value = %raw, "invalid PORT ({e}), using {DEFAULT_PORT}");
                }
            }
        }

        if let Some(host) = lookup("RELAY_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        config
    }

    /// `host:port` string suitable for [`tokio::net::TcpListener::bind`].
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Set the bind address.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the listening port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-connection outbox capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    /// Set the largest accepted inbound message, in bytes.
    #[must_use]
    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.outbox_capacity, 256);
        assert_eq!(config.max_frame_size, 64 * 1024);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn port_from_environment() {
        let config = RelayConfig::from_lookup(lookup(&[("PORT", "3000")]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn missing_port_falls_back() {
        let config = RelayConfig::from_lookup(lookup(&[]));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn non_numeric_port_falls_back() {
        for bad in ["abc", "", "-1", "70000", "80.5"] {
            let config = RelayConfig::from_lookup(lookup(&[("PORT", bad)]));
            assert_eq!(config.port, DEFAULT_PORT, "PORT={bad:?}");
        }
    }

    #[test]
    fn host_from_environment() {
        let config = RelayConfig::from_lookup(lookup(&[("RELAY_HOST", "127.0.0.1")]));
        assert_eq!(config.host, "127.0.0.1");

        let config = RelayConfig::from_lookup(lookup(&[("RELAY_HOST", "  ")]));
        assert_eq!(config.host, DEFAULT_HOST);
    }

    #[test]
    fn outbox_capacity_is_clamped_to_one() {
        let config = RelayConfig::default().with_outbox_capacity(0);
        assert_eq!(config.outbox_capacity, 1);
    }
}
