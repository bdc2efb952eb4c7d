//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Listeners to bind (plain or TLS).
    pub listeners: Vec<ListenerConfig>,

    /// Host routes served from configuration.
    pub hosts: Vec<HostConfig>,

    /// Logging settings.
    pub log: LogConfig,
}

/// One listener definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port to bind on all interfaces. 0 picks an ephemeral port.
    pub port: u16,

    /// Optional TLS material; presence makes this an HTTPS listener.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for a listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_file_name: PathBuf,

    /// Path to private key file (PEM).
    pub key_file_name: PathBuf,
}

/// One configured host route. Exactly one of `body` / `file` must be set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Host pattern, wildcard and group syntax included.
    pub pattern: String,

    /// Inline response body.
    #[serde(default)]
    pub body: Option<String>,

    /// File streamed as the response body.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing filter, overridable via `RUST_LOG`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
