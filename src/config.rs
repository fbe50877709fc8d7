//! # Configuration
//!
//! Server configuration comes from two environment variables and nothing
//! else — no on-disk state, no required command-line flags.

use crate::constants::{DEFAULT_HOST, DEFAULT_PORT};
use crate::errors::ConfigError;

/// Listening endpoint, read from `REDIS_HOST` / `REDIS_PORT`.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Reads `REDIS_HOST` (default `"0.0.0.0"`) and `REDIS_PORT` (default
    /// `9999`) from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match std::env::var("REDIS_PORT") {
            Err(_) => DEFAULT_PORT,
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidPort(raw, e))?,
        };
        Ok(Self { host, port })
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses `host:port` into a [`std::net::SocketAddr`] the listener can
    /// bind to directly.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        self.socket_addr_string()
            .parse()
            .map_err(|e| ConfigError::InvalidAddr(self.socket_addr_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        // SAFETY (test-only): no other test in this process mutates
        // REDIS_HOST/REDIS_PORT concurrently; tests run in this module's
        // own thread-unsynchronized env, which is acceptable here because
        // the crate itself never calls std::env::set_var at runtime.
        unsafe {
            std::env::remove_var("REDIS_HOST");
            std::env::remove_var("REDIS_PORT");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        unsafe {
            std::env::set_var("REDIS_PORT", "not-a-port");
        }
        let result = Config::from_env();
        unsafe {
            std::env::remove_var("REDIS_PORT");
        }
        assert!(matches!(result, Err(ConfigError::InvalidPort(_, _))));
    }

    #[test]
    fn socket_addr_parses_default_host_and_port() {
        unsafe {
            std::env::remove_var("REDIS_HOST");
            std::env::remove_var("REDIS_PORT");
        }
        let config = Config::from_env().unwrap();
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
    }
}
