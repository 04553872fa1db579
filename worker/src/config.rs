//! Configuration management for the projection worker.
//!
//! Loads configuration from environment variables with sensible defaults.

use paperboard_projections::RetryPolicy;
use paperboard_projections::pool::DEFAULT_MAX_IN_FLIGHT;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Event bus subscription configuration
    pub bus: BusConfig,
    /// Worker pool configuration
    pub pool: PoolConfig,
    /// Retry configuration for transient projection failures
    pub retry: RetryConfig,
}

/// Event bus subscription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Topic carrying post events (default: `post-events`)
    pub topic: String,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrently processed deliveries
    pub max_in_flight: usize,
    /// Shutdown drain timeout in seconds
    pub shutdown_timeout: u64,
}

/// Retry configuration for transient projection failures.
///
/// A delivery in backoff occupies its worker slot for the whole wait, so
/// aggressive delays combined with a small `max_in_flight` stall intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total delivery attempts, the first try included
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Backoff cap, in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier applied per failed attempt
    pub multiplier: f64,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            bus: BusConfig {
                topic: env::var("POST_EVENTS_TOPIC")
                    .unwrap_or_else(|_| "post-events".to_string()),
            },
            pool: PoolConfig {
                max_in_flight: env::var("PROJECTION_MAX_IN_FLIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_IN_FLIGHT),
                shutdown_timeout: env::var("PROJECTION_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            },
            retry: RetryConfig {
                max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
                base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                max_delay_ms: env::var("RETRY_MAX_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30_000),
                multiplier: env::var("RETRY_MULTIPLIER")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2.0),
            },
        }
    }

    /// The retry policy described by this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.retry.max_attempts)
            .base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .multiplier(self.retry.multiplier)
            .build()
    }

    /// How long shutdown waits for in-flight deliveries to settle.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            bus: BusConfig {
                topic: "post-events".to_string(),
            },
            pool: PoolConfig {
                max_in_flight: 4,
                shutdown_timeout: 7,
            },
            retry: RetryConfig {
                max_attempts: 5,
                base_delay_ms: 50,
                max_delay_ms: 10_000,
                multiplier: 3.0,
            },
        }
    }

    #[test]
    fn retry_policy_reflects_configuration() {
        let policy = config().retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(10_000));
        assert!((policy.multiplier - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn shutdown_timeout_converts_to_duration() {
        assert_eq!(config().shutdown_timeout(), Duration::from_secs(7));
    }
}
