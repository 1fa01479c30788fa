/// Row types for the `fraud_predictions` table and its aggregate queries.
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PredictionRecord {
    pub transaction_id: String,
    pub client_id: String,
    pub fraud_probability: f64,
    pub fraud_category: String,
    pub model_used: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ModelUsageRow {
    pub model_used: String,
    pub count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryCountRow {
    pub fraud_category: String,
    pub count: i64,
}

/// Per-model averages over every stored prediction.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ModelPerformanceRow {
    pub model_used: String,
    pub avg_probability: f64,
    pub prediction_count: i64,
    pub unique_clients: i64,
}

/// One calendar day (UTC) of `updated_at`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyTrendRow {
    pub day: String,
    pub avg_probability: f64,
    pub transaction_count: i64,
}
