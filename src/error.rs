use axum::{
    extract::rejection::{BytesRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Scoring failed on chunk {chunk_index}: {cause}")]
    Scoring {
        chunk_index: usize,
        #[source]
        cause: ModelError,
    },

    #[error("Persistence failed on chunk {chunk_index}: {cause}")]
    Persistence {
        chunk_index: usize,
        #[source]
        cause: sqlx::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to load model {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Stable identifier for programmatic handling of error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Schema { .. } => "schema_error",
            AppError::UnknownModel(_) => "unknown_model",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Csv(_) => "malformed_csv",
            AppError::Scoring { .. } => "scoring_error",
            AppError::Persistence { .. } => "persistence_error",
            AppError::Database(_) => "database_error",
            AppError::Migration(_) => "migration_error",
            AppError::ModelLoad { .. } => "model_load_error",
            AppError::Json(_) => "json_error",
            AppError::Config(_) => "config_error",
            AppError::Io(_) => "io_error",
        }
    }

    /// Client input faults are 400s; everything else is a processing fault.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Schema { .. }
            | AppError::UnknownModel(_)
            | AppError::InvalidRequest(_)
            | AppError::Csv(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Index of the chunk that stopped the pipeline, if any.
    pub fn failed_chunk(&self) -> Option<usize> {
        match self {
            AppError::Scoring { chunk_index, .. } | AppError::Persistence { chunk_index, .. } => {
                Some(*chunk_index)
            }
            _ => None,
        }
    }

    fn category(&self) -> String {
        match self {
            AppError::Schema { .. } => "Missing required columns".to_string(),
            AppError::UnknownModel(_) => "Unknown model".to_string(),
            AppError::InvalidRequest(_) => "Invalid request".to_string(),
            AppError::PayloadTooLarge(_) => "Upload too large".to_string(),
            AppError::Csv(_) => "Malformed CSV upload".to_string(),
            AppError::Scoring { chunk_index, .. } => {
                format!("Prediction failed for chunk {chunk_index}")
            }
            AppError::Persistence { chunk_index, .. } => {
                format!("Database operation failed for chunk {chunk_index}")
            }
            AppError::Database(_) | AppError::Migration(_) => {
                "Database operation failed".to_string()
            }
            _ => "Prediction failed".to_string(),
        }
    }

    fn details(&self) -> String {
        match self {
            AppError::Schema { missing } => missing.join(", "),
            AppError::UnknownModel(model) => model.clone(),
            AppError::InvalidRequest(reason) | AppError::PayloadTooLarge(reason) => reason.clone(),
            AppError::Csv(e) => e.to_string(),
            AppError::Scoring { cause, .. } => cause.to_string(),
            AppError::Persistence { cause, .. } => cause.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::InvalidRequest(rejection.body_text())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_chunk: Option<usize>,
}

impl From<&AppError> for ErrorBody {
    fn from(e: &AppError) -> Self {
        Self {
            error: e.category(),
            kind: e.kind(),
            details: e.details(),
            failed_chunk: e.failed_chunk(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(ErrorBody::from(&self))).into_response()
    }
}
