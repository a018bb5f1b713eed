//! Service configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional TOML file (`quickserve.toml` unless overridden)
//! 3. environment variables prefixed `QUICKSERVE__` (e.g. `QUICKSERVE__PORT=9000`)

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_CONFIG_FILE: &str = "quickserve.toml";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// How long `POST /async-endpoint` waits before answering.
    pub async_delay_ms: u64,
}

impl Config {
    /// Loads configuration from `path` (file need not exist) and the
    /// environment.
    pub fn load_from(path: &str) -> Result<Self, Error> {
        let settings = config::Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8000)?
            .set_default("log_level", "info")?
            .set_default("async_delay_ms", 2000)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("QUICKSERVE").prefix_separator("__").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, Error> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(config::ConfigError::Message(format!("invalid address: {e}"))))
    }

    pub fn async_delay(&self) -> Duration {
        Duration::from_millis(self.async_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            log_level: "info".to_owned(),
            async_delay_ms: 2000,
        }
    }
}
