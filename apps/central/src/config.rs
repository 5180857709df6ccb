//! Central daemon configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::time::Duration;

use abasto_db::{Backend, GatewayConfig};
use abasto_sync::BrokerConfig;

/// Central daemon configuration.
#[derive(Debug, Clone)]
pub struct CentralConfig {
    /// `sqlite` or `postgres`.
    pub db_backend: Backend,

    /// SQLite file path, or Postgres connection URL.
    pub db_target: String,

    /// Connection pool size.
    pub db_max_connections: u32,

    /// Kafka bootstrap servers.
    pub kafka_brokers: String,

    /// Consumer group id.
    pub kafka_group_id: String,

    /// Topic sale batches arrive on.
    pub ventas_topic: String,

    /// Topic poison batches are parked on.
    pub dead_letter_topic: String,

    /// Pause between retries of a transiently-failing batch, seconds.
    pub retry_delay_secs: u64,
}

impl CentralConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let db_backend = match env::var("DB_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .as_str()
        {
            "sqlite" => Backend::Sqlite,
            "postgres" => Backend::Postgres,
            other => return Err(ConfigError::InvalidValue(format!("DB_BACKEND={other}"))),
        };

        let db_target = match db_backend {
            Backend::Sqlite => {
                env::var("DB_PATH").unwrap_or_else(|_| "./data/abasto.db".to_string())
            }
            Backend::Postgres => env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingRequired("DATABASE_URL".to_string()))?,
        };

        Ok(CentralConfig {
            db_backend,
            db_target,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            kafka_brokers: env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            kafka_group_id: env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| "abasto-central".to_string()),
            ventas_topic: env::var("VENTAS_TOPIC")
                .unwrap_or_else(|_| "sync_ventas".to_string()),
            dead_letter_topic: env::var("DEAD_LETTER_TOPIC")
                .unwrap_or_else(|_| "sync_ventas_dlq".to_string()),
            retry_delay_secs: env::var("RETRY_DELAY_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RETRY_DELAY_SECS".to_string()))?,
        })
    }

    /// Gateway configuration derived from the env settings.
    pub fn gateway(&self) -> GatewayConfig {
        let base = match self.db_backend {
            Backend::Sqlite => GatewayConfig::sqlite(self.db_target.clone()),
            Backend::Postgres => GatewayConfig::postgres(self.db_target.clone()),
        };
        base.max_connections(self.db_max_connections)
    }

    /// Broker configuration derived from the env settings.
    pub fn broker(&self) -> BrokerConfig {
        BrokerConfig {
            brokers: self.kafka_brokers.clone(),
            group_id: self.kafka_group_id.clone(),
            ventas_topic: self.ventas_topic.clone(),
            dead_letter_topic: self.dead_letter_topic.clone(),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
