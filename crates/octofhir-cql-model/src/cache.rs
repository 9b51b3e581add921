//! Process-wide model cache
//!
//! Models are loaded at most once per id and shared read-only afterwards.
//! The cache is injected into each builder, so tests and independent
//! compilations can use separate caches.

use crate::error::ModelError;
use crate::model::Model;
use crate::provider::{ModelIdentifier, ModelProvider};
use indexmap::IndexMap;
use log::debug;
use octofhir_cql_types::SYSTEM_NAMESPACE;
use parking_lot::RwLock;
use std::sync::Arc;

/// Get-or-load cache of resolved models
pub struct ModelCache {
    provider: Arc<dyn ModelProvider>,
    system: Arc<Model>,
    models: RwLock<IndexMap<String, Arc<Model>>>,
}

impl ModelCache {
    /// Create a cache backed by `provider`
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            system: Arc::new(Model::system()),
            models: RwLock::new(IndexMap::new()),
        }
    }

    /// The built-in `System` model
    pub fn system(&self) -> Arc<Model> {
        Arc::clone(&self.system)
    }

    /// Resolve a model, loading it on first use
    ///
    /// Requesting a version different from the one already loaded fails.
    pub fn resolve_model(&self, identifier: &ModelIdentifier) -> Result<Arc<Model>, ModelError> {
        if identifier.id == SYSTEM_NAMESPACE {
            return Ok(self.system());
        }

        if let Some(model) = self.models.read().get(&identifier.id) {
            Self::check_version(identifier, model)?;
            return Ok(Arc::clone(model));
        }

        let mut models = self.models.write();
        if let Some(model) = models.get(&identifier.id) {
            Self::check_version(identifier, model)?;
            return Ok(Arc::clone(model));
        }

        debug!("Loading model {}", identifier);
        let info = self.provider.load_model_info(identifier)?;
        let model = Arc::new(Model::from_model_info(&info, &self.system)?);
        Self::check_version(identifier, &model)?;
        models.insert(identifier.id.clone(), Arc::clone(&model));
        Ok(model)
    }

    /// Ids of the models loaded so far
    pub fn loaded(&self) -> Vec<String> {
        self.models.read().keys().cloned().collect()
    }

    fn check_version(identifier: &ModelIdentifier, model: &Model) -> Result<(), ModelError> {
        match (&identifier.version, model.version()) {
            (Some(requested), Some(loaded)) if requested != loaded => {
                Err(ModelError::VersionConflict {
                    id: identifier.id.clone(),
                    requested: requested.clone(),
                    loaded: loaded.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("models", &self.loaded())
            .finish_non_exhaustive()
    }
}
