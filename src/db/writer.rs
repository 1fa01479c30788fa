use std::sync::Arc;

use tracing::{debug, info};

use crate::db::store::PredictionStore;
use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;
use crate::types::ScoredRow;

/// Persists scored chunks, one transaction per chunk, retrying the
/// transactional upsert as a whole under `RetryPolicy`.
pub struct PersistenceWriter {
    store: Arc<dyn PredictionStore>,
    retry: RetryPolicy,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn PredictionStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Upsert one chunk. Every attempt opens a fresh transaction over the
    /// whole batch; there is no partial-batch retry. Batches committed
    /// earlier are never touched by a later failure.
    pub async fn upsert_batch(&self, chunk_index: usize, rows: &[ScoredRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let store = &self.store;
        let what = format!("Upsert of chunk {chunk_index} ({} rows)", rows.len());
        self.retry
            .run(&what, move |attempt| {
                debug!(chunk = chunk_index, attempt, rows = rows.len(), "Upserting batch");
                store.upsert_many(rows)
            })
            .await
            .map_err(|cause| AppError::Persistence { chunk_index, cause })?;

        info!(chunk = chunk_index, rows = rows.len(), "Chunk committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::{scored, MemoryStore};
    use crate::types::ModelId;

    fn writer(store: Arc<MemoryStore>) -> PersistenceWriter {
        PersistenceWriter::new(store, RetryPolicy::fixed(3, Duration::from_millis(1)))
    }

    fn batch(n: usize) -> Vec<ScoredRow> {
        (0..n).map(|i| scored(&format!("tx-{i}"), 0.6, ModelId::Xgboost)).collect()
    }

    #[tokio::test]
    async fn commits_batch_once() {
        let store = Arc::new(MemoryStore::new());
        writer(store.clone()).upsert_batch(0, &batch(4)).await.unwrap();

        assert_eq!(store.attempts(), 1);
        assert_eq!(store.committed_batches(), vec![4]);
        assert_eq!(store.snapshot().len(), 4);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_whole() {
        let store = Arc::new(MemoryStore::failing_when(|_, attempt| attempt <= 2));
        writer(store.clone()).upsert_batch(0, &batch(5)).await.unwrap();

        assert_eq!(store.attempts(), 3);
        // One commit of the full batch, nothing from the failed attempts.
        assert_eq!(store.committed_batches(), vec![5]);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_persistence_error() {
        let store = Arc::new(MemoryStore::failing_when(|_, _| true));
        let err = writer(store.clone()).upsert_batch(4, &batch(3)).await.unwrap_err();

        assert!(matches!(err, AppError::Persistence { chunk_index: 4, .. }), "{err}");
        assert_eq!(store.attempts(), 3);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_skips_store() {
        let store = Arc::new(MemoryStore::new());
        writer(store.clone()).upsert_batch(0, &[]).await.unwrap();
        assert_eq!(store.attempts(), 0);
    }
}
