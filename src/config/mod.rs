//! Configuration: schema and loader.

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigError};
pub use schema::{EngineConfig, HostConfig, ListenerConfig, LogConfig, TlsConfig};
