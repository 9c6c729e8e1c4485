//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the quote gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Static file root and caching behavior.
    pub static_files: StaticFilesConfig,

    /// Upgraded channel settings.
    pub websocket: WebSocketConfig,

    /// Quote broadcaster cadence and fetch bounds.
    pub broadcaster: BroadcasterConfig,

    /// External quote provider.
    pub quote_source: QuoteSourceConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Whether the listener terminates TLS.
    pub fn is_encrypted(&self) -> bool {
        self.listener.tls.is_some()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration. Presence turns on the encrypted transport.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Static file serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory all file requests resolve under.
    pub root: String,

    /// Index document, as a request path.
    pub index: String,

    /// Lifetime advertised in `Cache-Control` and `Expires`.
    pub cache_seconds: u64,

    /// Chunk size used when streaming over an encrypted transport.
    pub chunk_size: usize,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: "./webapp".to_string(),
            index: "/index.html".to_string(),
            cache_seconds: 60,
            chunk_size: 8192,
        }
    }
}

/// Upgraded channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Advertised endpoint path.
    pub path: String,

    /// Largest accepted frame payload, and largest reassembled message.
    pub max_frame_size: usize,

    /// Frames a session may have queued before broadcasts to it are dropped.
    pub outbound_queue: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/wsticker".to_string(),
            max_frame_size: 65536,
            outbound_queue: 100,
        }
    }
}

/// Quote broadcaster configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Run the background broadcaster.
    pub enabled: bool,

    /// Fixed cadence between tick starts, in milliseconds.
    pub interval_ms: u64,

    /// Upper bound on a single quote fetch, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 2000,
            fetch_timeout_secs: 10,
        }
    }
}

/// External quote source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuoteSourceConfig {
    /// Batched quote endpoint.
    pub base_url: String,

    /// Table environment passed through to the provider.
    pub env: String,
}

impl Default for QuoteSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://query.yahooapis.com/v1/public/yql".to_string(),
            env: "http://datatables.org/alltables.env".to_string(),
        }
    }
}

/// Timeout configuration for HTTP exchanges.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (time to produce response headers) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
