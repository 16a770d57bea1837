use larder_order::OrderConfig;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local stores, for demos and tests.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

/// Without a url the order list cache stays in process memory.
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: None, cache_ttl_seconds: default_cache_ttl() }
    }
}

fn default_cache_ttl() -> u64 { 300 }

/// Without brokers notifications only go to the log.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrdersConfig {
    #[serde(default = "default_reservation_retries")]
    pub reservation_retries: u32,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            reservation_retries: default_reservation_retries(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_reservation_retries() -> u32 { 3 }
fn default_page_size() -> u32 { 20 }
fn default_max_page_size() -> u32 { 100 }

impl From<&OrdersConfig> for OrderConfig {
    fn from(c: &OrdersConfig) -> Self {
        OrderConfig {
            reservation_retries: c.reservation_retries,
            default_page_size: c.default_page_size,
            max_page_size: c.max_page_size,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `LARDER__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("LARDER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [storage]
            backend = "memory"
            [database]
            url = "postgres://localhost/larder"
            [auth]
            jwt_secret = "secret"
            "#,
        );

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.redis.url.is_none());
        assert!(config.kafka.brokers.is_none());
        assert_eq!(OrderConfig::from(&config.orders), OrderConfig::default());
    }

    #[test]
    fn test_orders_section_overrides() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [storage]
            backend = "postgres"
            [database]
            url = "postgres://localhost/larder"
            [auth]
            jwt_secret = "secret"
            [orders]
            reservation_retries = 0
            max_page_size = 50
            "#,
        );

        let orders = OrderConfig::from(&config.orders);
        assert_eq!(orders.reservation_retries, 0);
        assert_eq!(orders.default_page_size, 20);
        assert_eq!(orders.max_page_size, 50);
    }
}
