use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    /// `None` keeps sessions until they are closed explicitly.
    pub session_idle_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("MCP_SESSION_IDLE_TIMEOUT_SECS must be a non-negative integer")]
    InvalidIdleTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("PORT")
            .map(|value| {
                value
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort)
            })
            .transpose()?
            .unwrap_or(DEFAULT_PORT);
        let idle_secs = lookup("MCP_SESSION_IDLE_TIMEOUT_SECS")
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidIdleTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_SESSION_IDLE_TIMEOUT_SECS);

        let config = Self {
            bind_addr,
            port,
            session_idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = config_from(&[]).expect("config should parse");
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(
            config.session_idle_timeout,
            Some(Duration::from_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECS))
        );
    }

    #[test]
    fn port_override_is_used() {
        let config = config_from(&[("PORT", "3001")]).expect("config should parse");
        assert_eq!(config.port, 3001);
        assert_eq!(
            config.bind_socket().expect("valid socket"),
            "127.0.0.1:3001".parse().expect("socket addr")
        );
    }

    #[test]
    fn invalid_port_fails() {
        let err = config_from(&[("PORT", "70000")]).expect_err("expected invalid port");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn zero_idle_timeout_disables_expiry() {
        let config = config_from(&[("MCP_SESSION_IDLE_TIMEOUT_SECS", "0")])
            .expect("config should parse");
        assert_eq!(config.session_idle_timeout, None);
    }

    #[test]
    fn invalid_idle_timeout_fails() {
        let err = config_from(&[("MCP_SESSION_IDLE_TIMEOUT_SECS", "soon")])
            .expect_err("expected invalid timeout");
        assert!(matches!(err, ConfigError::InvalidIdleTimeout));
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let err = config_from(&[("BIND_ADDR", "not an address")])
            .expect_err("expected invalid socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }
}
