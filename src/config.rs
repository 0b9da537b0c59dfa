//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::store::IsolationLevel;
use crate::transfer::{RetryPolicy, TransferPolicy};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Isolation level for transfer transactions
    pub isolation_level: IsolationLevel,

    /// Attempts per transfer, including the first
    pub transfer_max_attempts: u32,

    /// Backoff base and ceiling between attempts (ms)
    pub transfer_retry_base_delay_ms: u64,
    pub transfer_retry_max_delay_ms: u64,

    pub reject_same_account: bool,

    pub require_sufficient_funds: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            isolation_level: parse_or("TRANSFER_ISOLATION_LEVEL", IsolationLevel::Serializable)?,
            transfer_max_attempts: parse_or("TRANSFER_MAX_ATTEMPTS", 5)?,
            transfer_retry_base_delay_ms: parse_or("TRANSFER_RETRY_BASE_DELAY_MS", 10)?,
            transfer_retry_max_delay_ms: parse_or("TRANSFER_RETRY_MAX_DELAY_MS", 500)?,
            reject_same_account: parse_or("TRANSFER_REJECT_SAME_ACCOUNT", false)?,
            require_sufficient_funds: parse_or("TRANSFER_REQUIRE_SUFFICIENT_FUNDS", false)?,
        })
    }

    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy {
            reject_same_account: self.reject_same_account,
            require_sufficient_funds: self.require_sufficient_funds,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.transfer_max_attempts,
            base_delay: Duration::from_millis(self.transfer_retry_base_delay_ms),
            max_delay: Duration::from_millis(self.transfer_retry_max_delay_ms),
        }
    }
}

/// Read `name`, falling back to `default` when it is unset
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
