//! Configuration management for the resize server

use std::env;

use thiserror::Error;

use crate::resize::MaxSide;

/// Default request body limit for `/resize` (64 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub resize: ResizeConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ResizeConfig {
    /// Used when a request carries no `max_side`
    pub default_max_side: MaxSide,
    pub max_upload_bytes: usize,
}

/// Invalid environment value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            resize: ResizeConfig {
                default_max_side: MaxSide::default(),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for
    /// unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                expected: "a TCP port number",
                value: raw,
            })?,
            None => defaults.server.port,
        };

        let default_max_side = match lookup("MAX_SIDE") {
            Some(raw) => MaxSide::parse(&raw).map_err(|_| ConfigError::Invalid {
                key: "MAX_SIDE",
                expected: "a positive integer",
                value: raw,
            })?,
            None => defaults.resize.default_max_side,
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => match raw.trim().parse::<usize>().ok() {
                Some(bytes) if bytes > 0 => bytes,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "MAX_UPLOAD_BYTES",
                        expected: "a positive byte count",
                        value: raw,
                    })
                }
            },
            None => defaults.resize.max_upload_bytes,
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
            },
            resize: ResizeConfig {
                default_max_side,
                max_upload_bytes,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.resize.default_max_side.get(), 1024);
        assert_eq!(config.resize.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("MAX_SIDE", "512"),
            ("SERVER_HOST", "127.0.0.1"),
            ("MAX_UPLOAD_BYTES", "1048576"),
        ]))
        .unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.resize.default_max_side.get(), 512);
        assert_eq!(config.resize.max_upload_bytes, 1024 * 1024);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("MAX_SIDE", "0")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "MAX_SIDE must be a positive integer, got \"0\""
        );
        assert!(Config::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[("MAX_UPLOAD_BYTES", "0")])).is_err());
    }
}
