//! Gradient-boosted tree ensemble loaded from a JSON artifact.
//!
//! Probability is `logistic(base_score + sum of leaf values)`. A split sends a
//! row left when `value < threshold`; missing values (empty cells, unknown
//! categories) follow the split's `default_left` flag.

use serde::Deserialize;

use super::{FeatureMatrix, Model, ModelError};

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsemble {
    pub name: String,
    /// Initial margin, in log-odds.
    #[serde(default)]
    pub base_score: f64,
    pub features: Vec<FeatureSpec>,
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeatureSpec {
    Numeric { name: String },
    /// Encoded as the value's position in `categories`.
    Categorical { name: String, categories: Vec<String> },
}

impl FeatureSpec {
    pub fn name(&self) -> &str {
        match self {
            FeatureSpec::Numeric { name } | FeatureSpec::Categorical { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    Leaf {
        value: f64,
    },
}

impl TreeEnsemble {
    /// Parse and validate an artifact. Errors are returned as plain strings;
    /// the registry attaches the model id.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let ensemble: TreeEnsemble = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        ensemble.validate()?;
        Ok(ensemble)
    }

    /// Children must come after their parent so every walk terminates.
    fn validate(&self) -> Result<(), String> {
        if self.features.is_empty() {
            return Err("artifact declares no features".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("tree {t} has no nodes"));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                if let Node::Split { feature, threshold, left, right, .. } = node {
                    if *feature >= self.features.len() {
                        return Err(format!("tree {t} node {i}: feature index {feature} out of range"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("tree {t} node {i}: threshold is not finite"));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= tree.nodes.len() {
                            return Err(format!("tree {t} node {i}: invalid child index {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_column(&self, spec: &FeatureSpec, matrix: &FeatureMatrix<'_>) -> Result<Vec<f64>, ModelError> {
        let cells = matrix
            .column(spec.name())
            .ok_or_else(|| ModelError::MissingFeature(spec.name().to_string()))?;

        cells
            .iter()
            .enumerate()
            .map(|(row, raw)| {
                let cell = raw.trim();
                if cell.is_empty() {
                    return Ok(f64::NAN);
                }
                match spec {
                    FeatureSpec::Numeric { name } => parse_numeric(cell).ok_or_else(|| {
                        ModelError::TypeMismatch {
                            feature: name.clone(),
                            row,
                            value: cell.to_string(),
                        }
                    }),
                    FeatureSpec::Categorical { categories, .. } => Ok(categories
                        .iter()
                        .position(|c| c == cell)
                        .map_or(f64::NAN, |i| i as f64)),
                }
            })
            .collect()
    }
}

impl Tree {
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right, default_left } => {
                    let v = row[*feature];
                    idx = if v.is_nan() {
                        if *default_left { *left } else { *right }
                    } else if v < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl Model for TreeEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, matrix: &FeatureMatrix<'_>) -> Result<Vec<f64>, ModelError> {
        let encoded = self
            .features
            .iter()
            .map(|spec| self.encode_column(spec, matrix))
            .collect::<Result<Vec<_>, _>>()?;

        let mut row = vec![0.0; encoded.len()];
        let mut out = Vec::with_capacity(matrix.rows());
        for r in 0..matrix.rows() {
            for (slot, column) in row.iter_mut().zip(&encoded) {
                *slot = column[r];
            }
            let margin = self.base_score + self.trees.iter().map(|t| t.evaluate(&row)).sum::<f64>();
            out.push(logistic(margin));
        }
        Ok(out)
    }
}

/// Booleans are accepted as 1/0, matching how the training frames were encoded.
fn parse_numeric(cell: &str) -> Option<f64> {
    if cell.eq_ignore_ascii_case("true") {
        return Some(1.0);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Some(0.0);
    }
    cell.parse::<f64>().ok()
}

fn logistic(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "name": "test-gbm",
        "base_score": 0.0,
        "features": [
            {"name": "amount", "kind": "numeric"},
            {"name": "use_chip", "kind": "categorical",
             "categories": ["Chip Transaction", "Swipe Transaction", "Online Transaction"]}
        ],
        "trees": [
            {"nodes": [
                {"split": {"feature": 0, "threshold": 100.0, "left": 1, "right": 2, "default_left": true}},
                {"leaf": {"value": -2.0}},
                {"leaf": {"value": 2.0}}
            ]},
            {"nodes": [
                {"split": {"feature": 1, "threshold": 1.5, "left": 1, "right": 2}},
                {"leaf": {"value": 0.0}},
                {"leaf": {"value": 1.0}}
            ]}
        ]
    }"#;

    fn matrix<'a>(amounts: &[&'a str], chips: &[&'a str]) -> FeatureMatrix<'a> {
        let mut m = FeatureMatrix::with_rows(amounts.len());
        m.push_column("amount", amounts.to_vec());
        m.push_column("use_chip", chips.to_vec());
        m
    }

    #[test]
    fn sums_leaves_through_logistic() {
        let model = TreeEnsemble::from_json(ARTIFACT).unwrap();
        let m = matrix(&["50", "500", "500"], &["Chip Transaction", "Swipe Transaction", "Online Transaction"]);
        let probs = model.predict(&m).unwrap();

        assert_eq!(probs.len(), 3);
        assert!((probs[0] - logistic(-2.0)).abs() < 1e-12);
        assert!((probs[1] - logistic(2.0)).abs() < 1e-12);
        assert!((probs[2] - logistic(3.0)).abs() < 1e-12);
    }

    #[test]
    fn missing_values_follow_default_direction() {
        let model = TreeEnsemble::from_json(ARTIFACT).unwrap();
        // Empty amount goes left (default_left); unknown category goes right.
        let probs = model.predict(&matrix(&[""], &["Tap To Pay"])).unwrap();
        assert!((probs[0] - logistic(-1.0)).abs() < 1e-12);
    }

    #[test]
    fn non_numeric_cell_is_type_mismatch() {
        let model = TreeEnsemble::from_json(ARTIFACT).unwrap();
        let err = model.predict(&matrix(&["12", "abc"], &["", ""])).unwrap_err();
        assert!(matches!(err, ModelError::TypeMismatch { row: 1, .. }), "{err}");
    }

    #[test]
    fn boolean_cells_parse_as_numbers() {
        assert_eq!(parse_numeric("True"), Some(1.0));
        assert_eq!(parse_numeric("false"), Some(0.0));
        assert_eq!(parse_numeric("3.5"), Some(3.5));
        assert_eq!(parse_numeric("x"), None);
    }

    #[test]
    fn missing_feature_column_is_reported() {
        let model = TreeEnsemble::from_json(ARTIFACT).unwrap();
        let mut m = FeatureMatrix::with_rows(1);
        m.push_column("amount", vec!["1"]);
        let err = model.predict(&m).unwrap_err();
        assert!(matches!(err, ModelError::MissingFeature(f) if f == "use_chip"));
    }

    #[test]
    fn rejects_backward_child_pointer() {
        let raw = r#"{
            "name": "bad",
            "features": [{"name": "amount", "kind": "numeric"}],
            "trees": [{"nodes": [
                {"split": {"feature": 0, "threshold": 1.0, "left": 0, "right": 1}},
                {"leaf": {"value": 0.0}}
            ]}]
        }"#;
        let err = TreeEnsemble::from_json(raw).unwrap_err();
        assert!(err.contains("invalid child index"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_feature() {
        let raw = r#"{
            "name": "bad",
            "features": [{"name": "amount", "kind": "numeric"}],
            "trees": [{"nodes": [
                {"split": {"feature": 3, "threshold": 1.0, "left": 1, "right": 2}},
                {"leaf": {"value": 0.0}},
                {"leaf": {"value": 1.0}}
            ]}]
        }"#;
        assert!(TreeEnsemble::from_json(raw).is_err());
    }

    #[test]
    fn no_trees_scores_base_margin() {
        let raw = r#"{"name": "flat", "base_score": 0.0,
                      "features": [{"name": "amount", "kind": "numeric"}], "trees": []}"#;
        let model = TreeEnsemble::from_json(raw).unwrap();
        let mut m = FeatureMatrix::with_rows(2);
        m.push_column("amount", vec!["1", "2"]);
        assert_eq!(model.predict(&m).unwrap(), vec![0.5, 0.5]);
    }
}
