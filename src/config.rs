use std::time::Duration;

use crate::error::{AppError, Result};

/// Columns every uploaded dataset must carry, in this order.
/// The first two identify the row; everything after them is a model feature.
pub const REQUIRED_COLUMNS: [&str; 13] = [
    "id",
    "client_id",
    "Amount($)",
    "Absolute_Amount",
    "day_of_week",
    "hour_of_day",
    "is_weekend",
    "use_chip",
    "merchant_city",
    "merchant_state",
    "mcc",
    "errors",
    "merchant_category",
];

/// Number of leading identifier columns in `REQUIRED_COLUMNS`.
pub const ID_COLUMNS: usize = 2;

/// Default rows per scoring-and-persistence chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Upper bound on rows bound into a single upsert statement.
/// Keeps 6 binds/row well under SQLite's variable limit regardless of chunk size.
pub const UPSERT_STATEMENT_MAX_ROWS: usize = 1000;

/// Default persistence retry policy: 3 attempts, 2s apart.
pub const DEFAULT_UPSERT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_UPSERT_RETRY_DELAY_MS: u64 = 2000;

/// Sample size bounds for the /predict response.
pub const SAMPLE_SIZE_MIN: i64 = 1;
pub const SAMPLE_SIZE_MAX: i64 = 100;
pub const DEFAULT_SAMPLE_SIZE: i64 = 5;

/// Read-side limits for GET /predictions.
pub const DEFAULT_PREDICTIONS_LIMIT: i64 = 100;
pub const MAX_PREDICTIONS_LIMIT: i64 = 10_000;

/// Window for GET /stats/trend, in days.
pub const DEFAULT_TREND_DAYS: i64 = 30;
pub const MAX_TREND_DAYS: i64 = 365;

/// Inclusive lower bounds of each risk category.
pub mod risk_thresholds {
    pub const VERY_HIGH_MIN: f64 = 0.9;
    pub const HIGH_MIN: f64 = 0.7;
    pub const MEDIUM_MIN: f64 = 0.5;
    pub const LOW_MIN: f64 = 0.3;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Directory holding `<model_id>.json` artifacts (MODELS_DIR)
    pub models_dir: String,
    /// Rows per chunk (CHUNK_SIZE)
    pub chunk_size: usize,
    /// Attempts per persistence batch, first try included (UPSERT_MAX_ATTEMPTS)
    pub upsert_max_attempts: u32,
    /// Fixed wait between persistence attempts (UPSERT_RETRY_DELAY_MS)
    pub upsert_retry_delay: Duration,
    /// Request body limit for CSV uploads (MAX_UPLOAD_BYTES)
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let chunk_size = parse_env("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if chunk_size == 0 {
            return Err(AppError::Config("CHUNK_SIZE must be greater than zero".to_string()));
        }
        let upsert_max_attempts = parse_env("UPSERT_MAX_ATTEMPTS", DEFAULT_UPSERT_MAX_ATTEMPTS)?;
        if upsert_max_attempts == 0 {
            return Err(AppError::Config(
                "UPSERT_MAX_ATTEMPTS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH")
                .unwrap_or_else(|_| "fraud_predictions.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            models_dir: std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string()),
            chunk_size,
            upsert_max_attempts,
            upsert_retry_delay: Duration::from_millis(parse_env(
                "UPSERT_RETRY_DELAY_MS",
                DEFAULT_UPSERT_RETRY_DELAY_MS,
            )?),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 100 * 1024 * 1024)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
