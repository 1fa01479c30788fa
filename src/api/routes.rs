use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        DefaultBodyLimit, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::{
    DEFAULT_PREDICTIONS_LIMIT, DEFAULT_SAMPLE_SIZE, DEFAULT_TREND_DAYS, MAX_PREDICTIONS_LIMIT,
    MAX_TREND_DAYS, SAMPLE_SIZE_MAX, SAMPLE_SIZE_MIN,
};
use crate::dataset::Dataset;
use crate::db::models::{
    CategoryCountRow, DailyTrendRow, ModelPerformanceRow, ModelUsageRow, PredictionRecord,
};
use crate::db::PersistenceWriter;
use crate::error::{AppError, Result};
use crate::model::ModelRegistry;
use crate::pipeline::{Pipeline, PipelineOutcome, ScoreRequest};
use crate::types::{ModelId, RiskCategory, ScoredRow};

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub registry: Arc<ModelRegistry>,
    pub writer: Arc<PersistenceWriter>,
    pub chunk_size: usize,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/predictions", get(list_predictions))
        .route("/stats/summary", get(get_stats_summary))
        .route("/stats/models", get(get_stats_models))
        .route("/stats/trend", get(get_stats_trend))
        .route("/stats/latency", get(get_stats_latency))
        .route("/models", get(get_models))
        .route("/health", get(get_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

/// Query extraction that reaches the handler even when parsing fails, so the
/// failure is answered with the JSON error body.
type QueryResult<T> = std::result::Result<Query<T>, QueryRejection>;

#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    pub model_type: Option<String>,
    pub sample_size: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictionsQuery {
    pub limit: Option<i64>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub days: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub status: &'static str,
    pub predictions: Vec<ScoredRow>,
    pub metadata: PredictMetadata,
}

#[derive(Debug, Serialize)]
pub struct PredictMetadata {
    pub total_transactions: usize,
    pub fraud_stats: FraudStats,
    pub model_used: ModelId,
    pub sample_size_returned: usize,
    /// Seconds with two decimals, e.g. "0.42"
    pub processing_time_seconds: String,
}

#[derive(Debug, Serialize)]
pub struct FraudStats {
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    /// Percentage with two decimals and a trailing `%`, e.g. "12.34%"
    pub fraud_percentage: String,
}

impl PredictResponse {
    fn from_outcome(outcome: PipelineOutcome, started: Instant) -> Self {
        let tally = outcome.tally;
        Self {
            status: "success",
            metadata: PredictMetadata {
                total_transactions: tally.total,
                fraud_stats: FraudStats {
                    high_risk_count: tally.high_risk,
                    medium_risk_count: tally.medium_risk,
                    fraud_percentage: format!("{:.2}%", tally.fraud_fraction() * 100.0),
                },
                model_used: outcome.model_used,
                sample_size_returned: outcome.sample.len(),
                processing_time_seconds: format!("{:.2}", started.elapsed().as_secs_f64()),
            },
            predictions: outcome.sample,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub total_predictions: i64,
    pub avg_fraud_probability: Option<f64>,
    pub high_risk_clients: i64,
    pub model_usage: Vec<ModelUsageRow>,
    pub risk_distribution: Vec<RiskBucket>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RiskBucket {
    pub category: RiskCategory,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelId>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub models_loaded: usize,
    pub requests_in_flight: u64,
    pub rows_committed: u64,
    pub requests_failed: u64,
    pub last_request_at_ns: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn predict(
    State(state): State<ApiState>,
    query: QueryResult<PredictQuery>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<PredictResponse>> {
    let started = Instant::now();
    let _guard = state.health.begin_request();

    let result = match (query, body) {
        (Ok(Query(params)), Ok(body)) => run_predict(&state, params, &body, started).await,
        (Err(rejection), _) => Err(rejection.into()),
        (_, Err(rejection)) => Err(rejection.into()),
    };
    if result.is_err() {
        state.health.record_failure();
    }
    result.map(Json)
}

async fn run_predict(
    state: &ApiState,
    params: PredictQuery,
    body: &[u8],
    started: Instant,
) -> Result<PredictResponse> {
    let sample_size = params.sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE);
    if !(SAMPLE_SIZE_MIN..=SAMPLE_SIZE_MAX).contains(&sample_size) {
        return Err(AppError::InvalidRequest(format!(
            "sample_size must be between {SAMPLE_SIZE_MIN} and {SAMPLE_SIZE_MAX}, got {sample_size}"
        )));
    }
    let model_id = params
        .model_type
        .ok_or_else(|| AppError::InvalidRequest("model_type is required".to_string()))?;

    // Reject an unknown model before spending time on the upload.
    state.registry.get(&model_id)?;

    let dataset = Dataset::from_csv(body)?;
    info!(
        model = %model_id,
        rows = dataset.len(),
        columns = dataset.columns().len(),
        bytes = body.len(),
        sample_size,
        "Prediction request received"
    );

    let pipeline = Pipeline::new(&state.registry, &state.writer, state.chunk_size)
        .with_latency(&state.latency)
        .with_health(&state.health);
    let request = ScoreRequest {
        dataset: &dataset,
        model_id: &model_id,
        sample_size: sample_size as usize,
    };
    let outcome = pipeline.run(request, Pcg64Mcg::from_entropy()).await?;
    debug!(chunks = outcome.chunks, model = %outcome.model_used, "Building response");

    Ok(PredictResponse::from_outcome(outcome, started))
}

async fn list_predictions(
    State(state): State<ApiState>,
    query: QueryResult<PredictionsQuery>,
) -> Result<Json<Vec<PredictionRecord>>> {
    let Query(params) = query?;
    let limit = params.limit.unwrap_or(DEFAULT_PREDICTIONS_LIMIT);
    if limit < 1 {
        return Err(AppError::InvalidRequest(format!("limit must be positive, got {limit}")));
    }
    let limit = limit.min(MAX_PREDICTIONS_LIMIT);

    let category = match params.category.as_deref() {
        None => None,
        Some(label) => Some(
            RiskCategory::ALL
                .into_iter()
                .find(|c| c.as_str() == label)
                .ok_or_else(|| AppError::InvalidRequest(format!("unknown category {label:?}")))?,
        ),
    };

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT transaction_id, client_id, fraud_probability, fraud_category,
                model_used, created_at, updated_at
         FROM fraud_predictions",
    );
    if let Some(category) = category {
        qb.push(" WHERE fraud_category = ").push_bind(category.as_str());
    }
    qb.push(" ORDER BY updated_at DESC, transaction_id LIMIT ").push_bind(limit);

    let rows = qb
        .build_query_as::<PredictionRecord>()
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows))
}

async fn get_stats_summary(State(state): State<ApiState>) -> Result<Json<SummaryResponse>> {
    let total_predictions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fraud_predictions")
        .fetch_one(&state.pool)
        .await?;

    let avg_fraud_probability: Option<f64> =
        sqlx::query_scalar("SELECT AVG(fraud_probability) FROM fraud_predictions")
            .fetch_one(&state.pool)
            .await?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(DISTINCT client_id) FROM fraud_predictions WHERE fraud_category IN (",
    );
    let mut labels = qb.separated(", ");
    for category in RiskCategory::ALL.into_iter().filter(|c| c.is_high_risk()) {
        labels.push_bind(category.as_str());
    }
    qb.push(")");
    let high_risk_clients: i64 = qb.build_query_scalar().fetch_one(&state.pool).await?;

    let model_usage = sqlx::query_as::<_, ModelUsageRow>(
        "SELECT model_used, COUNT(*) AS count FROM fraud_predictions
         GROUP BY model_used ORDER BY count DESC, model_used",
    )
    .fetch_all(&state.pool)
    .await?;

    let category_counts = sqlx::query_as::<_, CategoryCountRow>(
        "SELECT fraud_category, COUNT(*) AS count FROM fraud_predictions
         GROUP BY fraud_category",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(SummaryResponse {
        total_predictions,
        avg_fraud_probability,
        high_risk_clients,
        model_usage,
        risk_distribution: risk_distribution(&category_counts, total_predictions),
    }))
}

/// One bucket per category, most severe first, zero-filled.
/// Percentages are rounded to two decimals.
fn risk_distribution(counts: &[CategoryCountRow], total: i64) -> Vec<RiskBucket> {
    RiskCategory::ALL
        .into_iter()
        .map(|category| {
            let count = counts
                .iter()
                .filter(|r| r.fraud_category == category.as_str())
                .map(|r| r.count)
                .sum::<i64>();
            let percentage = if total > 0 {
                (count as f64 * 10_000.0 / total as f64).round() / 100.0
            } else {
                0.0
            };
            RiskBucket { category, count, percentage }
        })
        .collect()
}

async fn get_stats_models(State(state): State<ApiState>) -> Result<Json<Vec<ModelPerformanceRow>>> {
    let rows = sqlx::query_as::<_, ModelPerformanceRow>(
        "SELECT model_used,
                AVG(fraud_probability) AS avg_probability,
                COUNT(*) AS prediction_count,
                COUNT(DISTINCT client_id) AS unique_clients
         FROM fraud_predictions
         GROUP BY model_used
         ORDER BY prediction_count DESC, model_used",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

/// Daily average probability over the last `days` days of `updated_at`, oldest first.
async fn get_stats_trend(
    State(state): State<ApiState>,
    query: QueryResult<TrendQuery>,
) -> Result<Json<Vec<DailyTrendRow>>> {
    let Query(params) = query?;
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);
    if !(1..=MAX_TREND_DAYS).contains(&days) {
        return Err(AppError::InvalidRequest(format!(
            "days must be between 1 and {MAX_TREND_DAYS}, got {days}"
        )));
    }

    let rows = sqlx::query_as::<_, DailyTrendRow>(
        "SELECT date(updated_at) AS day,
                AVG(fraud_probability) AS avg_probability,
                COUNT(*) AS transaction_count
         FROM fraud_predictions
         WHERE updated_at >= datetime('now', ?)
         GROUP BY day
         ORDER BY day ASC",
    )
    .bind(format!("-{days} days"))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

async fn get_models(State(state): State<ApiState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.registry.ids(),
    })
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Health check: database unreachable: {e}");
            false
        }
    };
    let health = &state.health;
    let last = health.last_request_at_ns();

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        models_loaded: state.registry.len(),
        requests_in_flight: health.requests_in_flight(),
        rows_committed: health.rows_committed(),
        requests_failed: health.requests_failed(),
        last_request_at_ns: (last > 0).then_some(last),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
