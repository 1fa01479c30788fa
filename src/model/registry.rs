use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use super::{Model, TreeEnsemble};
use crate::error::{AppError, Result};
use crate::types::ModelId;

/// Immutable set of loaded models, built once at startup and shared by `Arc`.
pub struct ModelRegistry {
    models: BTreeMap<ModelId, Box<dyn Model>>,
}

/// A model resolved for one request.
#[derive(Clone, Copy)]
pub struct SelectedModel<'a> {
    pub id: ModelId,
    pub model: &'a dyn Model,
}

impl ModelRegistry {
    /// Load `<models_dir>/<id>.json` for every known model id.
    /// Any failure aborts the whole load: a partial registry is never returned.
    pub fn load<P: AsRef<Path>>(models_dir: P) -> Result<Self> {
        let models_dir = models_dir.as_ref();
        let mut models: BTreeMap<ModelId, Box<dyn Model>> = BTreeMap::new();

        for id in ModelId::ALL {
            let path = models_dir.join(format!("{id}.json"));
            let raw = std::fs::read_to_string(&path).map_err(|e| AppError::ModelLoad {
                model: id.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
            let ensemble = TreeEnsemble::from_json(&raw).map_err(|reason| AppError::ModelLoad {
                model: id.to_string(),
                reason,
            })?;

            info!(
                model = %id,
                path = %path.display(),
                trees = ensemble.trees.len(),
                features = ensemble.features.len(),
                "Model loaded"
            );
            models.insert(id, Box::new(ensemble));
        }

        info!(count = models.len(), "Loaded {} models from {}", models.len(), models_dir.display());
        Ok(Self { models })
    }

    #[cfg(test)]
    pub fn from_models(models: impl IntoIterator<Item = (ModelId, Box<dyn Model>)>) -> Self {
        Self {
            models: models.into_iter().collect(),
        }
    }

    /// Resolve a model selector. Unknown or unloaded ids fail with `UnknownModel`.
    pub fn get(&self, model_id: &str) -> Result<SelectedModel<'_>> {
        let id: ModelId = model_id.parse()?;
        self.models
            .get(&id)
            .map(|model| SelectedModel { id, model: model.as_ref() })
            .ok_or_else(|| AppError::UnknownModel(model_id.to_string()))
    }

    pub fn ids(&self) -> Vec<ModelId> {
        self.models.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// `id (artifact name)` pairs for startup logs.
    pub fn describe(&self) -> String {
        self.models
            .iter()
            .map(|(id, model)| format!("{id} ({})", model.name()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "name": "stub",
        "features": [{"name": "Amount($)", "kind": "numeric"}],
        "trees": [{"nodes": [{"leaf": {"value": 0.0}}]}]
    }"#;

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("fraud-registry-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_every_known_model() {
        let dir = scratch_dir("full");
        for id in ModelId::ALL {
            std::fs::write(dir.join(format!("{id}.json")), ARTIFACT).unwrap();
        }

        let registry = ModelRegistry::load(&dir).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.describe(), "xgboost (stub), lightgbm (stub)");
        assert_eq!(registry.get("xgboost").unwrap().id, ModelId::Xgboost);
        assert_eq!(registry.get("lightgbm").unwrap().model.name(), "stub");
    }

    #[test]
    fn missing_artifact_fails_whole_load() {
        let dir = scratch_dir("partial");
        std::fs::write(dir.join("xgboost.json"), ARTIFACT).unwrap();
        let _ = std::fs::remove_file(dir.join("lightgbm.json"));

        let err = ModelRegistry::load(&dir).err().expect("load must fail");
        assert!(matches!(err, AppError::ModelLoad { ref model, .. } if model == "lightgbm"), "{err}");
    }

    #[test]
    fn corrupt_artifact_fails_whole_load() {
        let dir = scratch_dir("corrupt");
        std::fs::write(dir.join("xgboost.json"), "{ not json").unwrap();
        std::fs::write(dir.join("lightgbm.json"), ARTIFACT).unwrap();

        let err = ModelRegistry::load(&dir).err().expect("load must fail");
        assert!(matches!(err, AppError::ModelLoad { ref model, .. } if model == "xgboost"));
    }

    #[test]
    fn shipped_artifacts_score_uploads() {
        let registry = ModelRegistry::load(concat!(env!("CARGO_MANIFEST_DIR"), "/models")).unwrap();
        let ds = crate::testutil::dataset_with_amounts(&[12.5, 4800.0, -30.0]);

        for id in ModelId::ALL {
            let scorer = crate::scorer::ChunkedScorer::new(&ds, registry.get(id.as_str()).unwrap(), 2).unwrap();
            let rows: Vec<_> = scorer.flat_map(|c| c.unwrap().rows).collect();
            assert_eq!(rows.len(), 3, "{id}");
            assert!(rows.iter().all(|r| r.fraud_probability > 0.0 && r.fraud_probability < 1.0));
        }
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let registry = ModelRegistry::from_models(Vec::new());
        assert!(matches!(registry.get("catboost"), Err(AppError::UnknownModel(_))));
        // Known id that was never loaded.
        assert!(matches!(registry.get("xgboost"), Err(AppError::UnknownModel(_))));
    }
}
