//! Client configuration.
//!
//! Settings come from defaults, a JSON document, or the environment:
//!
//! ```
//! use clrbridge_client::BridgeConfig;
//!
//! let config = BridgeConfig::from_json(r#"{ "host": "10.0.0.5", "retries": 1 }"#).unwrap();
//! assert_eq!(config.host, "10.0.0.5");
//! assert_eq!(config.port, 56789);
//! assert_eq!(config.retries, 1);
//! ```
//!
//! Environment variables (all optional):
//! - `CLRBRIDGE_HOST`
//! - `CLRBRIDGE_PORT`
//! - `CLRBRIDGE_RETRIES`
//! - `CLRBRIDGE_RETRY_DELAY_MS`

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 56789;

/// Default number of connect retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 4;

/// Default delay between connect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default read buffer size (32KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 8192;

/// Default write buffer size (8KB).
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 8192;

/// Environment variable names.
pub mod env {
    pub const HOST: &str = "CLRBRIDGE_HOST";
    pub const PORT: &str = "CLRBRIDGE_PORT";
    pub const RETRIES: &str = "CLRBRIDGE_RETRIES";
    pub const RETRY_DELAY_MS: &str = "CLRBRIDGE_RETRY_DELAY_MS";
}

/// Connection settings for an [`Api`](crate::Api).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Server host name or address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Retries after the first failed connect attempt.
    pub retries: u32,
    /// Delay between connect attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Defaults overlaid with `CLRBRIDGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup(env::HOST) {
            config.host = host;
        }
        if let Some(port) = lookup(env::PORT) {
            config.port = parse_var(env::PORT, &port)?;
        }
        if let Some(retries) = lookup(env::RETRIES) {
            config.retries = parse_var(env::RETRIES, &retries)?;
        }
        if let Some(delay) = lookup(env::RETRY_DELAY_MS) {
            config.retry_delay_ms = parse_var(env::RETRY_DELAY_MS, &delay)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(BridgeError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(BridgeError::Config("port must be non-zero".to_string()));
        }
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(BridgeError::Config(
                "buffer sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay between connect attempts.
    #[inline]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BridgeError::Config(format!("invalid value for {}: {:?}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 56789);
        assert_eq!(config.retries, 4);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.read_buffer_size, 32768);
        assert_eq!(config.write_buffer_size, 8192);
    }

    #[test]
    fn test_from_json_partial() {
        let config = BridgeConfig::from_json(r#"{"port": 6000, "retry_delay_ms": 10}"#).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6000);
        assert_eq!(config.retry_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_from_json_rejects_zero_port() {
        let err = BridgeConfig::from_json(r#"{"port": 0}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_from_json_malformed() {
        let err = BridgeConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, BridgeError::Json(_)));
    }

    #[test]
    fn test_lookup_overlay() {
        let vars: HashMap<&str, &str> = [
            (env::HOST, "bridge.local"),
            (env::PORT, "7001"),
            (env::RETRIES, "0"),
        ]
        .into_iter()
        .collect();

        let config = BridgeConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.host, "bridge.local");
        assert_eq!(config.port, 7001);
        assert_eq!(config.retries, 0);
        assert_eq!(config.retry_delay_ms, 2000);
    }

    #[test]
    fn test_lookup_bad_number() {
        let err = BridgeConfig::from_lookup(|name| {
            (name == env::PORT).then(|| "not-a-port".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(env::PORT));
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = BridgeConfig {
            host: "h".into(),
            ..BridgeConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(BridgeConfig::from_json(&json).unwrap(), config);
    }
}
