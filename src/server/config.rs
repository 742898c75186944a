//! Server configuration
//!
//! Values arrive from a launcher (flags, environment); defaults here
//! match what the launcher falls back to.

use std::time::Duration;

use crate::protocol::DEFAULT_MAX_LINE_LEN;

/// Configuration for a [`TimecodeServer`](crate::server::TimecodeServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,

    /// Listen port (0 = auto-assign)
    pub port: u16,

    /// Enable the periodic status log
    pub status_reporting: bool,

    /// Per-client outbound queue depth; overflowing it triggers the
    /// slow-consumer disconnect
    pub channel_capacity: usize,

    /// Maximum accepted request line length
    pub max_line_len: usize,

    /// How long shutdown waits for connection handlers before aborting
    /// them
    pub shutdown_deadline: Duration,

    /// Status reporter period
    pub status_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            status_reporting: true,
            channel_capacity: 256,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            shutdown_deadline: Duration::from_secs(5),
            status_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Set the listen host
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the listen port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable the status reporter
    #[must_use]
    pub fn status_reporting(mut self, enabled: bool) -> Self {
        self.status_reporting = enabled;
        self
    }

    /// Set the shutdown deadline
    #[must_use]
    pub fn shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    /// Set the status reporter period
    #[must_use]
    pub fn status_interval(mut self, period: Duration) -> Self {
        self.status_interval = period;
        self
    }
}
