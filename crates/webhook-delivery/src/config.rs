/*!
 * Configuration Module for Webhook Delivery
 */

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::scheduler::SchedulerConfig;

/// Main configuration for the Webhook Delivery service.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum size of the Postgres connection pool
    pub database_max_connections: u32,

    /// Maximum number of deliveries claimed per poll
    pub batch_size: i64,

    /// Sleep between poll cycles when nothing was claimed
    pub poll_interval: Duration,

    /// Maximum number of concurrent in-flight attempts
    pub max_concurrency: usize,

    /// Maximum attempts before a delivery is dead-lettered
    pub max_attempts: i32,

    /// Backoff base delay, in milliseconds
    pub base_delay_ms: u64,

    /// Backoff cap, in milliseconds
    pub max_delay_ms: u64,

    /// Per-attempt HTTP timeout
    pub attempt_timeout: Duration,

    /// Time allowed for in-flight work to finish during graceful shutdown
    pub drain_timeout: Duration,

    /// Health/readiness/metrics HTTP port
    pub health_port: u16,
}

impl DeliveryConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "25".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a valid number")?;

        let batch_size = env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<i64>()
            .context("BATCH_SIZE must be a valid number")?;

        let poll_interval = Duration::from_millis(
            env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse::<u64>()
                .context("POLL_INTERVAL_MS must be a valid number")?,
        );

        let max_concurrency = env::var("MAX_CONCURRENCY")
            .unwrap_or_else(|_| "32".to_string())
            .parse::<usize>()
            .context("MAX_CONCURRENCY must be a valid number")?;

        let max_attempts = env::var("MAX_ATTEMPTS")
            .unwrap_or_else(|_| "8".to_string())
            .parse::<i32>()
            .context("MAX_ATTEMPTS must be a valid number")?;

        let base_delay_ms = env::var("BASE_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse::<u64>()
            .context("BASE_MS must be a valid number")?;

        let max_delay_ms = env::var("MAX_DELAY_MS")
            .unwrap_or_else(|_| "3600000".to_string())
            .parse::<u64>()
            .context("MAX_DELAY_MS must be a valid number")?;

        let attempt_timeout = Duration::from_secs(
            env::var("ATTEMPT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .context("ATTEMPT_TIMEOUT_SECS must be a valid number")?,
        );

        let drain_timeout = Duration::from_secs(
            env::var("DRAIN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .context("DRAIN_TIMEOUT_SECS must be a valid number")?,
        );

        let health_port = env::var("HEALTH_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("HEALTH_PORT must be a valid port number")?;

        Ok(Self {
            database_url,
            database_max_connections,
            batch_size,
            poll_interval,
            max_concurrency,
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            attempt_timeout,
            drain_timeout,
            health_port,
        })
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            base_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            max_attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DeliveryConfig {
        DeliveryConfig {
            database_url: "postgresql://localhost/test".to_string(),
            database_max_connections: 25,
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            max_concurrency: 32,
            max_attempts: 8,
            base_delay_ms: 30_000,
            max_delay_ms: 3_600_000,
            attempt_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
            health_port: 8080,
        }
    }

    #[test]
    fn scheduler_config_mirrors_delivery_config() {
        let config = sample_config();
        let scheduler_config = config.scheduler_config();
        assert_eq!(scheduler_config.base_ms, config.base_delay_ms);
        assert_eq!(scheduler_config.max_delay_ms, config.max_delay_ms);
        assert_eq!(scheduler_config.max_attempts, config.max_attempts);
    }
}
