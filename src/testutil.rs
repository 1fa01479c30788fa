//! Fixtures shared by unit tests across modules.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::REQUIRED_COLUMNS;
use crate::dataset::Dataset;
use crate::db::PredictionStore;
use crate::model::{FeatureMatrix, Model, ModelError, ModelRegistry};
use crate::types::{ModelId, RiskCategory, ScoredRow};

pub const CSV_HEADER: &str = "id,client_id,Amount($),Absolute_Amount,day_of_week,hour_of_day,is_weekend,use_chip,merchant_city,merchant_state,mcc,errors,merchant_category";

/// One valid row per amount, ids `tx-{i}` and `client-{i}`.
pub fn csv_with_amounts(amounts: &[f64]) -> String {
    debug_assert_eq!(CSV_HEADER.split(',').count(), REQUIRED_COLUMNS.len());
    let mut csv = format!("{CSV_HEADER}\n");
    for (i, amount) in amounts.iter().enumerate() {
        csv.push_str(&format!(
            "tx-{i},client-{i},{amount},{},{},{},0,Swipe Transaction,Austin,TX,5411,,Groceries\n",
            amount.abs(),
            i % 7,
            i % 24,
        ));
    }
    csv
}

pub fn dataset_with_amounts(amounts: &[f64]) -> Dataset {
    Dataset::from_csv(csv_with_amounts(amounts).as_bytes()).unwrap()
}

/// Scores `Amount($) / 1000`, clamped to [0, 1].
pub struct AmountModel {
    truncate: bool,
}

impl AmountModel {
    pub fn new() -> Self {
        Self { truncate: false }
    }

    /// Returns one probability per chunk regardless of row count.
    pub fn truncating() -> Self {
        Self { truncate: true }
    }
}

impl Model for AmountModel {
    fn name(&self) -> &str {
        "amount"
    }

    fn predict(&self, features: &FeatureMatrix<'_>) -> Result<Vec<f64>, ModelError> {
        let column = features
            .column("Amount($)")
            .ok_or_else(|| ModelError::MissingFeature("Amount($)".to_string()))?;
        let mut probs = Vec::with_capacity(column.len());
        for (row, raw) in column.iter().enumerate() {
            let amount: f64 = raw.parse().map_err(|_| ModelError::TypeMismatch {
                feature: "Amount($)".to_string(),
                row,
                value: raw.to_string(),
            })?;
            probs.push((amount / 1000.0).clamp(0.0, 1.0));
        }
        if self.truncate {
            probs.truncate(1);
        }
        Ok(probs)
    }
}

/// Both model ids served by `AmountModel`.
pub fn registry() -> ModelRegistry {
    ModelRegistry::from_models(
        ModelId::ALL
            .into_iter()
            .map(|id| (id, Box::new(AmountModel::new()) as Box<dyn Model>)),
    )
}

pub fn scored(id: &str, p: f64, model: ModelId) -> ScoredRow {
    ScoredRow {
        transaction_id: id.to_string(),
        client_id: format!("client-{id}"),
        fraud_probability: p,
        fraud_category: RiskCategory::from_probability(p),
        model_used: model,
    }
}

pub fn rng() -> Pcg64Mcg {
    Pcg64Mcg::seed_from_u64(7)
}

/// Migrated in-memory database on a single long-lived connection.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

type FailWhen = Box<dyn Fn(&[ScoredRow], usize) -> bool + Send + Sync>;

/// All-or-nothing in-memory store. `fail_when` sees each batch with its
/// 1-based attempt number across the store's lifetime.
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, ScoredRow>>,
    batches: Mutex<Vec<usize>>,
    attempts: AtomicUsize,
    fail_when: Option<FailWhen>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            batches: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_when: None,
        }
    }

    pub fn failing_when<F>(f: F) -> Self
    where
        F: Fn(&[ScoredRow], usize) -> bool + Send + Sync + 'static,
    {
        Self {
            fail_when: Some(Box::new(f)),
            ..Self::new()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sizes of successfully committed batches, in commit order.
    pub fn committed_batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ScoredRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn upsert_many(&self, rows: &[ScoredRow]) -> Result<(), sqlx::Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(fail) = &self.fail_when {
            if fail(rows, attempt) {
                return Err(sqlx::Error::Protocol("injected failure".into()));
            }
        }
        let mut stored = self.rows.lock().unwrap();
        for row in rows {
            stored.insert(row.transaction_id.clone(), row.clone());
        }
        self.batches.lock().unwrap().push(rows.len());
        Ok(())
    }
}
