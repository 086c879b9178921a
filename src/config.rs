//! RallyCast configuration
//!
//! Everything comes from `RALLYCAST_*` environment variables, with defaults
//! that match the platform's local development setup.

use std::net::SocketAddr;
use std::time::Duration;

/// Default WebSocket bind address
const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Default WebSocket route
const DEFAULT_WS_PATH: &str = "/ws/presence";

/// Default per-connection outbound queue capacity
const DEFAULT_SEND_QUEUE: usize = 64;

/// RallyCast configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address the WebSocket server binds to
    pub bind_addr: SocketAddr,
    /// Route the presence socket is served on
    pub ws_path: String,
    /// Bounded capacity of each connection's outbound queue; frames beyond
    /// it are dropped rather than blocking the sender
    pub send_queue_capacity: usize,
    /// Evict a connection whose last inbound frame is older than this.
    /// None (the default) trusts the transport's own close signal.
    pub idle_timeout: Option<Duration>,
    /// PostgreSQL connection string for the block-relation store
    pub database_url: Option<String>,
}

impl Config {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = std::env::var("RALLYCAST_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidEnv("RALLYCAST_BIND", "expected host:port"))?;

        let ws_path =
            std::env::var("RALLYCAST_WS_PATH").unwrap_or_else(|_| DEFAULT_WS_PATH.to_string());

        let send_queue_capacity = match std::env::var("RALLYCAST_SEND_QUEUE") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|&capacity| capacity > 0)
                .ok_or(ConfigError::InvalidEnv(
                    "RALLYCAST_SEND_QUEUE",
                    "expected a positive integer",
                ))?,
            Err(_) => DEFAULT_SEND_QUEUE,
        };

        let idle_timeout = match std::env::var("RALLYCAST_IDLE_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    ConfigError::InvalidEnv("RALLYCAST_IDLE_TIMEOUT_SECS", "expected seconds")
                })?;
                // 0 disables the timer
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        let database_url = std::env::var("RALLYCAST_DATABASE_URL").ok();

        Ok(Self {
            bind_addr,
            ws_path,
            send_queue_capacity,
            idle_timeout,
            database_url,
        })
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(&'static str, &'static str),
}
