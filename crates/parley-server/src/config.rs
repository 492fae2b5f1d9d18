//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use parley_shared::constants::{
    APP_NAME, DEFAULT_AUTH_TIMEOUT_SECS, DEFAULT_HTTP_PORT, DEFAULT_MAX_CONTENT_LEN,
    DEFAULT_OUTBOUND_QUEUE_CAPACITY,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: none (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,

    /// Maximum message content length in bytes.
    /// Env: `MAX_CONTENT_LEN`
    pub max_content_len: usize,

    /// How long a fresh connection may stay unauthenticated.
    /// Env: `AUTH_TIMEOUT_SECS`
    pub auth_timeout: Duration,

    /// Per-session outbound queue depth. A push that finds the queue full
    /// is dropped.
    /// Env: `OUTBOUND_QUEUE_CAPACITY`
    pub outbound_queue_capacity: usize,

    /// Sustained WebSocket actions per second per identity.
    /// Env: `EVENT_RATE`
    pub event_rate: f64,

    /// WebSocket action burst per identity.
    /// Env: `EVENT_BURST`
    pub event_burst: f64,

    /// Sustained HTTP requests per second per client IP.
    /// Env: `HTTP_RATE`
    pub http_rate: f64,

    /// HTTP request burst per client IP.
    /// Env: `HTTP_BURST`
    pub http_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            instance_name: APP_NAME.to_string(),
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
            auth_timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            event_rate: 20.0,
            event_burst: 40.0,
            http_rate: 10.0,
            http_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<SocketAddr>(&lookup, "HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(name) = lookup("INSTANCE_NAME").filter(|n| !n.is_empty()) {
            config.instance_name = name;
        }

        if let Some(len) = parse_var::<usize>(&lookup, "MAX_CONTENT_LEN").filter(|n| *n > 0) {
            config.max_content_len = len;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "AUTH_TIMEOUT_SECS").filter(|n| *n > 0) {
            config.auth_timeout = Duration::from_secs(secs);
        }

        if let Some(cap) = parse_var::<usize>(&lookup, "OUTBOUND_QUEUE_CAPACITY").filter(|n| *n > 0)
        {
            config.outbound_queue_capacity = cap;
        }

        if let Some(rate) = parse_var::<f64>(&lookup, "EVENT_RATE").filter(|r| *r > 0.0) {
            config.event_rate = rate;
        }
        if let Some(burst) = parse_var::<f64>(&lookup, "EVENT_BURST").filter(|b| *b >= 1.0) {
            config.event_burst = burst;
        }
        if let Some(rate) = parse_var::<f64>(&lookup, "HTTP_RATE").filter(|r| *r > 0.0) {
            config.http_rate = rate;
        }
        if let Some(burst) = parse_var::<f64>(&lookup, "HTTP_BURST").filter(|b| *b >= 1.0) {
            config.http_burst = burst;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Parse `key` if set; an unparsable value is logged and ignored.
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
