//! Relay configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Missing or unparseable optional values fall back to their
//! defaults; only a bad `LISTEN_ADDR` or `WS_PATH` is fatal.

use std::net::SocketAddr;

use crate::service::RoutingPolicy;

/// Port the relay has always listened on.
pub const DEFAULT_PORT: u16 = 44791;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Path the WebSocket upgrade is served at, in addition to `/ws`.
    pub ws_path: String,

    /// Per-connection outbound queue depth. Payloads beyond it are dropped.
    pub outbound_queue_capacity: usize,

    /// Announce avatar removal on transport errors too.
    pub remove_on_error: bool,

    /// Restrict sources to publishing their registered guid.
    pub strict_source_guid: bool,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            ws_path: "/".to_string(),
            outbound_queue_capacity: 64,
            remove_on_error: false,
            strict_source_guid: false,
            log_format: LogFormat::Text,
        }
    }
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as a
    /// [`SocketAddr`], or `WS_PATH` does not start with `/`.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(addr) => addr.parse()?,
            None => defaults.listen_addr,
        };

        let ws_path = lookup("WS_PATH").unwrap_or(defaults.ws_path);
        if !ws_path.starts_with('/') {
            return Err(format!("WS_PATH must start with '/': {ws_path}").into());
        }

        let outbound_queue_capacity = parse_or(
            lookup("OUTBOUND_QUEUE_CAPACITY"),
            defaults.outbound_queue_capacity,
        )
        .max(1);
        let remove_on_error = parse_bool_or(lookup("REMOVE_ON_ERROR"), defaults.remove_on_error);
        let strict_source_guid =
            parse_bool_or(lookup("STRICT_SOURCE_GUID"), defaults.strict_source_guid);

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            ws_path,
            outbound_queue_capacity,
            remove_on_error,
            strict_source_guid,
            log_format,
        })
    }

    /// Routing policy derived from this configuration.
    #[must_use]
    pub const fn routing_policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            remove_on_error: self.remove_on_error,
            strict_source_guid: self.strict_source_guid,
        }
    }
}

/// Parses `value` as `T`, returning `default` on missing or invalid input.
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool_or(value: Option<String>, default: bool) -> bool {
    match value.map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}
