use csv::StringRecord;
use tracing::debug;

use crate::config::{ID_COLUMNS, REQUIRED_COLUMNS};
use crate::dataset::Dataset;
use crate::error::{AppError, Result};
use crate::model::registry::SelectedModel;
use crate::model::{FeatureMatrix, ModelError};
use crate::types::{RiskCategory, ScoredRow};

/// One scored partition of the input, in input order.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub index: usize,
    pub rows: Vec<ScoredRow>,
}

/// Lazily scores a dataset chunk by chunk. Nothing is scored until `next()`
/// is called, and only one chunk's rows are materialised at a time.
///
/// Yields `Err(AppError::Scoring)` at most once, after which the sequence ends.
pub struct ChunkedScorer<'a> {
    dataset: &'a Dataset,
    model: SelectedModel<'a>,
    chunk_size: usize,
    id_column: usize,
    client_column: usize,
    feature_columns: Vec<(&'static str, usize)>,
    next_index: usize,
    halted: bool,
}

impl<'a> ChunkedScorer<'a> {
    /// Validates the required columns for the whole dataset up front.
    pub fn new(dataset: &'a Dataset, model: SelectedModel<'a>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidRequest("chunk size must be greater than zero".to_string()));
        }

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| dataset.column_index(c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Schema { missing });
        }

        // Presence was checked above.
        let index_of = |name: &str| dataset.column_index(name).unwrap_or_default();
        let feature_columns = REQUIRED_COLUMNS[ID_COLUMNS..]
            .iter()
            .map(|name| (*name, index_of(name)))
            .collect();

        Ok(Self {
            dataset,
            model,
            chunk_size,
            id_column: index_of(REQUIRED_COLUMNS[0]),
            client_column: index_of(REQUIRED_COLUMNS[1]),
            feature_columns,
            next_index: 0,
            halted: false,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.dataset.len().div_ceil(self.chunk_size)
    }

    fn score_chunk(&self, index: usize, records: &'a [StringRecord]) -> Result<ScoredChunk> {
        let mut matrix = FeatureMatrix::with_rows(records.len());
        for &(name, col) in &self.feature_columns {
            matrix.push_column(name, records.iter().map(|r| r.get(col).unwrap_or("")).collect());
        }

        let probs = self
            .model
            .model
            .predict(&matrix)
            .and_then(|probs| check_output(&probs, records.len()).map(|_| probs))
            .map_err(|cause| AppError::Scoring { chunk_index: index, cause })?;

        let model_used = self.model.id;
        let rows = records
            .iter()
            .zip(probs)
            .map(|(record, p)| ScoredRow {
                transaction_id: record.get(self.id_column).unwrap_or("").to_string(),
                client_id: record.get(self.client_column).unwrap_or("").to_string(),
                fraud_probability: p,
                fraud_category: RiskCategory::from_probability(p),
                model_used,
            })
            .collect();

        Ok(ScoredChunk { index, rows })
    }
}

impl Iterator for ChunkedScorer<'_> {
    type Item = Result<ScoredChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }
        let records = self.dataset.records();
        let start = self.next_index * self.chunk_size;
        if start >= records.len() {
            return None;
        }
        let end = (start + self.chunk_size).min(records.len());
        let index = self.next_index;
        self.next_index += 1;

        debug!(
            chunk = index,
            rows = end - start,
            model = %self.model.id,
            artifact = self.model.model.name(),
            "Scoring chunk"
        );
        let result = self.score_chunk(index, &records[start..end]);
        if result.is_err() {
            self.halted = true;
        }
        Some(result)
    }
}

fn check_output(probs: &[f64], expected: usize) -> std::result::Result<(), ModelError> {
    if probs.len() != expected {
        return Err(ModelError::OutputLength { expected, got: probs.len() });
    }
    if let Some((row, &value)) = probs.iter().enumerate().find(|(_, p)| !p.is_finite()) {
        return Err(ModelError::NonFinite { row, value });
    }
    Ok(())
}
