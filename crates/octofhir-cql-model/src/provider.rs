//! Model provider collaborator
//!
//! A provider supplies `ModelInfo` descriptions by identifier. Loading from
//! files or the network is left to implementors; the in-memory provider
//! serves descriptions registered up front.

use crate::error::ModelError;
use crate::model_info::{parse_json, ModelInfo};
use indexmap::IndexMap;
use std::fmt;

/// Identifier of a model as written in a `using` declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelIdentifier {
    /// Model id (e.g. "FHIR")
    pub id: String,
    /// Requested version; `None` accepts any
    pub version: Option<String>,
}

impl ModelIdentifier {
    pub fn new(id: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            id: id.into(),
            version: version.map(String::from),
        }
    }
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} version '{}'", self.id, version),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Trait for supplying model descriptions
pub trait ModelProvider: Send + Sync {
    /// Load the description of the identified model
    fn load_model_info(&self, identifier: &ModelIdentifier) -> Result<ModelInfo, ModelError>;
}

/// Provider serving descriptions registered in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryModelProvider {
    models: IndexMap<String, ModelInfo>,
}

impl InMemoryModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a description under its model name
    pub fn with_model_info(mut self, info: ModelInfo) -> Self {
        self.models.insert(info.name.clone(), info);
        self
    }

    /// Register a description given in JSON
    pub fn with_json(self, json: &str) -> Result<Self, ModelError> {
        let info = parse_json(json)?;
        Ok(self.with_model_info(info))
    }
}

impl ModelProvider for InMemoryModelProvider {
    fn load_model_info(&self, identifier: &ModelIdentifier) -> Result<ModelInfo, ModelError> {
        let not_found = || ModelError::NotFound {
            id: identifier.id.clone(),
            version: identifier.version.clone(),
        };
        let info = self.models.get(&identifier.id).ok_or_else(not_found)?;
        match (&identifier.version, &info.version) {
            (Some(requested), Some(available)) if requested != available => Err(not_found()),
            _ => Ok(info.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serves_registered_model() {
        let provider = InMemoryModelProvider::new()
            .with_json(r#"{"name": "Test", "version": "1.0", "url": "http://test.org"}"#)
            .unwrap();
        let info = provider
            .load_model_info(&ModelIdentifier::new("Test", Some("1.0")))
            .unwrap();
        assert_eq!(info.url, "http://test.org");
        assert!(provider.load_model_info(&ModelIdentifier::new("Test", None)).is_ok());
    }

    #[test]
    fn test_unknown_version_not_found() {
        let provider =
            InMemoryModelProvider::new().with_model_info(ModelInfo::new("Test", Some("1.0"), ""));
        assert!(matches!(
            provider.load_model_info(&ModelIdentifier::new("Test", Some("2.0"))),
            Err(ModelError::NotFound { .. })
        ));
        assert!(provider.load_model_info(&ModelIdentifier::new("Other", None)).is_err());
    }
}
