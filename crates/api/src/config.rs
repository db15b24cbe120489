//! API process configuration.

use std::net::SocketAddr;

use thiserror::Error;

use edumyles_infra::InfraConfig;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid LISTEN_ADDR {value:?}: {source}")]
    ListenAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
    pub infra: InfraConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup("LISTEN_ADDR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let listen_addr = raw
            .parse()
            .map_err(|source| ConfigError::ListenAddr { value: raw.clone(), source })?;

        Ok(Self {
            listen_addr,
            infra: InfraConfig::from_lookup(&lookup),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all_interfaces_on_8080() {
        let config = ApiConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR.parse().unwrap());
        assert_eq!(config.infra, InfraConfig::default());
    }

    #[test]
    fn reads_listen_addr_and_infra_settings() {
        let config = ApiConfig::from_lookup(|key| match key {
            "LISTEN_ADDR" => Some("127.0.0.1:3000".into()),
            "DATABASE_URL" => Some("postgres://localhost/edumyles".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.listen_addr.port(), 3000);
        assert!(config.infra.database_url.is_some());
        assert!(config.infra.redis_url.is_none());
    }

    #[test]
    fn rejects_malformed_listen_addr() {
        let err = ApiConfig::from_lookup(|key| (key == "LISTEN_ADDR").then(|| "localhost".into()))
            .unwrap_err();

        assert!(err.to_string().contains("localhost"));
    }
}
