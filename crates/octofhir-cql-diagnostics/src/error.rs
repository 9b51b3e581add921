//! Translator error types

use crate::{ErrorCode, ErrorKind, Locator};
use thiserror::Error;

/// Main translator error type
#[derive(Debug, Clone, Error)]
pub enum CqlError {
    /// Syntax error reported by the parse driver
    #[error("{code}: {message}")]
    Parse {
        code: ErrorCode,
        message: String,
        locator: Option<Locator>,
    },

    /// Semantic error (resolution, typing, scoping)
    #[error("{code}: {message}")]
    Semantic {
        code: ErrorCode,
        message: String,
        locator: Option<Locator>,
    },

    /// Model error
    #[error("{code}: {message}")]
    Model {
        code: ErrorCode,
        message: String,
        model: Option<String>,
    },

    /// Failure resolving an included library
    #[error("{code}: {message}")]
    Include {
        code: ErrorCode,
        message: String,
        library_id: String,
        version: Option<String>,
        locator: Option<Locator>,
    },

    /// System error (driver misuse, configuration)
    #[error("{code}: {message}")]
    System { code: ErrorCode, message: String },

    /// Multiple errors collected
    #[error("Multiple errors: {}", .0.len())]
    Multiple(Vec<CqlError>),
}

impl CqlError {
    /// Create a syntax error
    pub fn parse(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Parse {
            code,
            message: message.into(),
            locator: None,
        }
    }

    /// Create a semantic error
    pub fn semantic(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Semantic {
            code,
            message: message.into(),
            locator: None,
        }
    }

    /// Create a model error
    pub fn model(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Model {
            code,
            message: message.into(),
            model: None,
        }
    }

    /// Create an include error naming the library that failed
    pub fn include(
        code: ErrorCode,
        message: impl Into<String>,
        library_id: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self::Include {
            code,
            message: message.into(),
            library_id: library_id.into(),
            version,
            locator: None,
        }
    }

    /// Create a system error
    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
        }
    }

    /// Attach a source locator; variants without one are returned unchanged
    pub fn at(mut self, at: Locator) -> Self {
        match &mut self {
            Self::Parse { locator, .. }
            | Self::Semantic { locator, .. }
            | Self::Include { locator, .. } => {
                if locator.is_none() {
                    *locator = Some(at);
                }
            }
            _ => {}
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { code, .. }
            | Self::Semantic { code, .. }
            | Self::Model { code, .. }
            | Self::Include { code, .. }
            | Self::System { code, .. } => *code,
            Self::Multiple(errors) => errors.first().map(|e| e.code()).unwrap_or(ErrorCode::new(0)),
        }
    }

    /// Taxonomy bucket of this error
    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    /// Whether this error must abort the whole compilation
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Multiple(errors) => errors.iter().any(CqlError::is_fatal),
            _ => self.kind().is_fatal(),
        }
    }

    /// Message without the code prefix
    pub fn message(&self) -> String {
        match self {
            Self::Parse { message, .. }
            | Self::Semantic { message, .. }
            | Self::Model { message, .. }
            | Self::Include { message, .. }
            | Self::System { message, .. } => message.clone(),
            Self::Multiple(errors) => errors
                .iter()
                .map(CqlError::message)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// Get the locator if available
    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Self::Parse { locator, .. }
            | Self::Semantic { locator, .. }
            | Self::Include { locator, .. } => locator.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CQL0100, CQL0103, CQL0400};

    #[test]
    fn test_semantic_error() {
        let err = CqlError::semantic(
            CQL0100,
            "Could not resolve identifier X in the current library.",
        );
        assert_eq!(err.code(), CQL0100);
        assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "CQL0100: Could not resolve identifier X in the current library."
        );
    }

    #[test]
    fn test_at_keeps_first_locator() {
        let err = CqlError::semantic(CQL0100, "x")
            .at(Locator::new(1, 1, 1, 2))
            .at(Locator::new(9, 9, 9, 9));
        assert_eq!(err.locator(), Some(&Locator::new(1, 1, 1, 2)));
    }

    #[test]
    fn test_include_error_keeps_locator() {
        let err = CqlError::include(CQL0103, "Could not load library", "Common", Some("1.0".into()))
            .at(Locator::new(2, 1, 2, 20));
        let CqlError::Include { library_id, version, .. } = &err else {
            panic!("expected an include error");
        };
        assert_eq!(library_id, "Common");
        assert_eq!(version.as_deref(), Some("1.0"));
        assert_eq!(err.locator(), Some(&Locator::new(2, 1, 2, 20)));
    }

    #[test]
    fn test_fatal_in_multiple() {
        let err = CqlError::Multiple(vec![
            CqlError::semantic(CQL0100, "a"),
            CqlError::system(CQL0400, "Expression context stack is empty."),
        ]);
        assert!(err.is_fatal());
        assert_eq!(err.message(), "a; Expression context stack is empty.");
    }
}
