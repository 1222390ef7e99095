use crate::core::{AppError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

use crate::modules::installments::services::LedgerPolicy;

/// Width of the `installments.notes` column
const NOTES_COLUMN_LEN: usize = 2000;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub overdue_job: OverdueJobConfig,
    pub payments: PaymentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// `json` for structured output, anything else for human-readable lines
    pub log_format: String,
}

/// Settings for the recurring overdue sweep
#[derive(Debug, Clone, Deserialize)]
pub struct OverdueJobConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Tenants swept in parallel
    pub concurrency: usize,
    /// A `running` row older than this is reported as stuck
    pub stuck_after_secs: u64,
}

/// Limits applied when recording a payment
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub overpayment_tolerance: Decimal,
    pub notes_max_len: usize,
}

impl PaymentConfig {
    pub fn ledger_policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            overpayment_tolerance: self.overpayment_tolerance,
            max_notes_len: self.notes_max_len,
        }
    }
}

/// Read an optional variable, falling back to `default` when unset
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid {}", key))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let interval_secs = env_or("OVERDUE_JOB_INTERVAL_SECS", 3600u64)?;

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            overdue_job: OverdueJobConfig {
                enabled: env_or("OVERDUE_JOB_ENABLED", true)?,
                interval_secs,
                concurrency: env_or("OVERDUE_JOB_CONCURRENCY", 4usize)?,
                stuck_after_secs: env_or("OVERDUE_JOB_STUCK_AFTER_SECS", interval_secs * 3 / 2)?,
            },
            payments: PaymentConfig {
                overpayment_tolerance: env_or(
                    "PAYMENT_OVERPAYMENT_TOLERANCE",
                    Decimal::new(10, 2),
                )?,
                notes_max_len: env_or("PAYMENT_NOTES_MAX_LEN", 500usize)?,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.overdue_job.interval_secs == 0 {
            return Err(AppError::Configuration(
                "Overdue job interval must be greater than 0".to_string(),
            ));
        }

        if self.overdue_job.concurrency == 0 {
            return Err(AppError::Configuration(
                "Overdue job concurrency must be greater than 0".to_string(),
            ));
        }

        if self.overdue_job.stuck_after_secs < self.overdue_job.interval_secs {
            return Err(AppError::Configuration(
                "Stuck threshold must not be shorter than the job interval".to_string(),
            ));
        }

        if self.payments.overpayment_tolerance < Decimal::ZERO {
            return Err(AppError::Configuration(
                "Overpayment tolerance cannot be negative".to_string(),
            ));
        }

        if self.payments.notes_max_len > NOTES_COLUMN_LEN {
            return Err(AppError::Configuration(format!(
                "Payment notes limit cannot exceed {} characters",
                NOTES_COLUMN_LEN
            )));
        }

        Ok(())
    }
}
