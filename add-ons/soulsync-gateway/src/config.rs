//! Gateway settings: `config/gateway.toml` (or `SOULSYNC_GATEWAY_CONFIG`) overlaid with
//! `SOULSYNC__*` environment variables.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub app_name: String,
    pub port: u16,
    pub bind_address: String,
    /// Overrides `SOULSYNC_STORAGE_PATH` when set.
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Allowed browser origins. Empty allows none.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_name: "SoulSync Gateway".to_string(),
            port: 8001,
            bind_address: "127.0.0.1".to_string(),
            storage_path: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl GatewayConfig {
    /// Precedence: environment > config file > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var("SOULSYNC_GATEWAY_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());
        config::Config::builder()
            .set_default("app_name", "SoulSync Gateway")?
            .set_default("port", 8001_i64)?
            .set_default("bind_address", "127.0.0.1")?
            .set_default("cors_origins", vec!["http://localhost:3000"])?
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("SOULSYNC")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors_origins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind_address, self.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_localhost() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.socket_addr().unwrap().to_string(), "127.0.0.1:8001");
        assert!(cfg.storage_path.is_none());
    }

    #[test]
    fn bad_bind_address_is_an_error() {
        let cfg = GatewayConfig {
            bind_address: "not an ip".to_string(),
            ..GatewayConfig::default()
        };
        assert!(cfg.socket_addr().is_err());
    }
}
