//! Service configuration from the environment.

use std::net::SocketAddr;

use anyhow::Context;

pub const BIND_ADDR_ENV: &str = "COLLO_BIND_ADDR";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_value(std::env::var(BIND_ADDR_ENV).ok().as_deref())
    }

    fn from_value(bind_addr: Option<&str>) -> anyhow::Result<Self> {
        let raw = bind_addr.unwrap_or(DEFAULT_BIND_ADDR);
        let bind_addr = raw
            .parse()
            .with_context(|| format!("{BIND_ADDR_ENV} is not a socket address: '{raw}'"))?;
        Ok(Self { bind_addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all_interfaces_on_8080() {
        let config = ApiConfig::from_value(None).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
    }

    #[test]
    fn rejects_malformed_address() {
        let err = ApiConfig::from_value(Some("localhost")).unwrap_err();
        assert!(err.to_string().contains(BIND_ADDR_ENV));
    }
}
