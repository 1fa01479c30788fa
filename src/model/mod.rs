//! Scoring models and the registry that serves them.

pub mod ensemble;
pub mod registry;

pub use ensemble::TreeEnsemble;
pub use registry::ModelRegistry;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature column {0:?} is missing from the input")]
    MissingFeature(String),

    #[error("feature {feature:?} expects a number, got {value:?} at row {row}")]
    TypeMismatch {
        feature: String,
        row: usize,
        value: String,
    },

    #[error("model returned {got} probabilities for {expected} rows")]
    OutputLength { expected: usize, got: usize },

    #[error("model returned non-finite probability {value} at row {row}")]
    NonFinite { row: usize, value: f64 },
}

/// A loaded binary classifier. Implementations are immutable after load and
/// shared across concurrent requests.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// Probability of the positive (fraud) class for every row of `features`,
    /// in row order. One call per chunk.
    fn predict(&self, features: &FeatureMatrix<'_>) -> Result<Vec<f64>, ModelError>;
}

/// Column-major view of one chunk's feature cells, borrowed from the dataset.
#[derive(Debug, Default)]
pub struct FeatureMatrix<'a> {
    names: Vec<&'a str>,
    columns: Vec<Vec<&'a str>>,
    rows: usize,
}

impl<'a> FeatureMatrix<'a> {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            rows,
        }
    }

    pub fn push_column(&mut self, name: &'a str, values: Vec<&'a str>) {
        debug_assert_eq!(values.len(), self.rows, "column {name} has wrong length");
        self.names.push(name);
        self.columns.push(values);
    }

    pub fn column(&self, name: &str) -> Option<&[&'a str]> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}
