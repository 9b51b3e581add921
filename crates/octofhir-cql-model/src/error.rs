//! Model loading errors

use crate::model_info::ParseError;
use octofhir_cql_diagnostics::{CQL0300, CQL0301, CQL0302, CqlError};
use octofhir_cql_types::TypeError;

/// Errors raised while loading or resolving a model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(
        "Could not resolve model info provider for model {id}{}.",
        .version.as_ref().map(|v| format!(", version {}", v)).unwrap_or_default()
    )]
    NotFound { id: String, version: Option<String> },

    #[error(
        "Could not load model information for model {id}, version {requested} because version {loaded} is already loaded."
    )]
    VersionConflict {
        id: String,
        requested: String,
        loaded: String,
    },

    #[error("Could not resolve type {name} in model {model}.")]
    UnknownType { model: String, name: String },

    #[error("Type {0} inherits from itself.")]
    InheritanceCycle(String),

    #[error("Invalid model info: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl ModelError {
    fn model_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { id, .. } | Self::VersionConflict { id, .. } => Some(id),
            Self::UnknownType { model, .. } => Some(model),
            _ => None,
        }
    }
}

impl From<ModelError> for CqlError {
    fn from(err: ModelError) -> Self {
        let code = match &err {
            ModelError::NotFound { .. } => CQL0300,
            ModelError::VersionConflict { .. } => CQL0301,
            _ => CQL0302,
        };
        CqlError::Model {
            code,
            message: err.to_string(),
            model: err.model_id().map(String::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cql_diagnostics::ErrorKind;

    #[test]
    fn test_version_conflict_message() {
        let err: CqlError = ModelError::VersionConflict {
            id: "FHIR".into(),
            requested: "4.0.1".into(),
            loaded: "3.0.0".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ModelVersionConflict);
        assert_eq!(
            err.message(),
            "Could not load model information for model FHIR, version 4.0.1 because version 3.0.0 is already loaded."
        );
    }

    #[test]
    fn test_not_found_code() {
        let err: CqlError = ModelError::NotFound {
            id: "QDM".into(),
            version: None,
        }
        .into();
        assert_eq!(err.code(), CQL0300);
        assert_eq!(err.message(), "Could not resolve model info provider for model QDM.");
    }
}
