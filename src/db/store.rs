use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::config::UPSERT_STATEMENT_MAX_ROWS;
use crate::types::ScoredRow;

/// Transactional upsert-many capability consumed by the persistence writer.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Write `rows` inside exactly one transaction: begin, upsert every row,
    /// commit. On any error the transaction is rolled back before returning,
    /// so a failed call leaves no trace in storage.
    async fn upsert_many(&self, rows: &[ScoredRow]) -> Result<(), sqlx::Error>;
}

/// SQLite-backed store. Each call checks a connection out of the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PredictionStore for SqliteStore {
    async fn upsert_many(&self, rows: &[ScoredRow]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        match upsert_rows(&mut *tx, rows).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback after failed upsert also failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}

/// Multi-row `INSERT .. ON CONFLICT DO UPDATE`. Conflicts on `transaction_id`
/// overwrite the score columns and bump `updated_at`; `client_id` and
/// `created_at` keep their first-written values.
async fn upsert_rows(conn: &mut SqliteConnection, rows: &[ScoredRow]) -> Result<(), sqlx::Error> {
    for batch in rows.chunks(UPSERT_STATEMENT_MAX_ROWS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO fraud_predictions (
                transaction_id, client_id, fraud_probability,
                fraud_category, model_used, updated_at
            ) ",
        );
        qb.push_values(batch, |mut b, row| {
            b.push_bind(row.transaction_id.as_str())
                .push_bind(row.client_id.as_str())
                .push_bind(row.fraud_probability)
                .push_bind(row.fraud_category.as_str())
                .push_bind(row.model_used.as_str())
                .push("CURRENT_TIMESTAMP");
        });
        qb.push(
            " ON CONFLICT(transaction_id) DO UPDATE SET
                fraud_probability = excluded.fraud_probability,
                fraud_category = excluded.fraud_category,
                model_used = excluded.model_used,
                updated_at = CURRENT_TIMESTAMP",
        );
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}
