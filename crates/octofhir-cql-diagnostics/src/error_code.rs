//! Translator error codes following a structured numbering system
//!
//! Error code ranges:
//! - CQL0001-CQL0099: Syntax errors reported by the parse driver
//! - CQL0100-CQL0199: Semantic errors (resolution, typing, scoping)
//! - CQL0300-CQL0399: Model errors (type catalogs)
//! - CQL0400-CQL0499: System errors (driver misuse, configuration)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric code
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Get error information for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    /// The taxonomy bucket this code belongs to
    pub fn kind(&self) -> ErrorKind {
        self.info().kind
    }

    /// Check if this is a syntax error (0001-0099)
    pub const fn is_parse_error(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    /// Check if this is a semantic error (0100-0199)
    pub const fn is_semantic_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// Check if this is a model error (0300-0399)
    pub const fn is_model_error(&self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Check if this is a system error (0400-0499)
    pub const fn is_system_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CQL{:04}", self.0)
    }
}

/// Condition-based classification of translator failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed source reported by the parse driver
    Syntax,
    /// A required collaborator or option is missing
    Configuration,
    /// A model was requested again with a different version
    ModelVersionConflict,
    /// More than one equally good candidate
    AmbiguousResolution,
    /// Nothing matched and resolution was mandatory
    UnresolvedReference,
    /// Private definition referenced from another library
    AccessViolation,
    /// Reference across evaluation contexts that cannot be promoted
    InvalidContext,
    /// Definition referenced while it is still being defined
    CircularReference,
    /// Scope stack misuse by the driver
    InvalidState,
    /// Element marked as not referenceable
    ProhibitedMember,
    /// Types are neither related nor convertible
    TypeMismatch,
    /// Name registered twice in one library namespace
    DuplicateDefinition,
    /// Model description could not be turned into types
    InvalidModel,
    /// IR output could not be produced
    Serialization,
}

impl ErrorKind {
    /// Fatal kinds indicate driver misuse and abort the whole compilation
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration | Self::InvalidState)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Configuration => "configuration",
            Self::ModelVersionConflict => "model version conflict",
            Self::AmbiguousResolution => "ambiguous resolution",
            Self::UnresolvedReference => "unresolved reference",
            Self::AccessViolation => "access violation",
            Self::InvalidContext => "invalid context",
            Self::CircularReference => "circular reference",
            Self::InvalidState => "invalid state",
            Self::ProhibitedMember => "prohibited member",
            Self::TypeMismatch => "type mismatch",
            Self::DuplicateDefinition => "duplicate definition",
            Self::InvalidModel => "invalid model",
            Self::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// Information about an error code
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Short description of the error
    pub description: &'static str,
    /// Taxonomy bucket
    pub kind: ErrorKind,
    /// Detailed help text
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(kind: ErrorKind, description: &'static str) -> Self {
        Self {
            description,
            kind,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new(ErrorKind::InvalidState, "Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    use ErrorKind::{
        AccessViolation, AmbiguousResolution, CircularReference, Configuration,
        DuplicateDefinition, InvalidContext, InvalidModel, InvalidState, ModelVersionConflict,
        ProhibitedMember, Serialization, Syntax, TypeMismatch, UnresolvedReference,
    };

    let mut map = HashMap::new();

    // Syntax errors (0001-0099)
    map.insert(1, ErrorInfo::new(Syntax, "Syntax error"));

    // Semantic errors (0100-0199)
    map.insert(100, ErrorInfo::new(UnresolvedReference, "Could not resolve identifier"));
    map.insert(
        101,
        ErrorInfo::new(UnresolvedReference, "Could not resolve call")
            .with_help("Check the operand types against the declared signatures"),
    );
    map.insert(102, ErrorInfo::new(UnresolvedReference, "Could not resolve type name"));
    map.insert(103, ErrorInfo::new(UnresolvedReference, "Could not resolve library"));
    map.insert(104, ErrorInfo::new(UnresolvedReference, "Could not resolve member"));
    map.insert(105, ErrorInfo::new(UnresolvedReference, "Could not resolve model name"));
    map.insert(106, ErrorInfo::new(UnresolvedReference, "Could not determine signature"));
    map.insert(
        107,
        ErrorInfo::new(UnresolvedReference, "Unnamed libraries cannot include other libraries")
            .with_help("Set the library identifier before adding includes"),
    );
    map.insert(109, ErrorInfo::new(DuplicateDefinition, "Duplicate definition"));
    map.insert(110, ErrorInfo::new(TypeMismatch, "Type mismatch"));
    map.insert(111, ErrorInfo::new(TypeMismatch, "A named type is required in this context"));
    map.insert(112, ErrorInfo::new(AmbiguousResolution, "Ambiguous type name or label"));
    map.insert(113, ErrorInfo::new(AmbiguousResolution, "Ambiguous call"));
    map.insert(114, ErrorInfo::new(CircularReference, "Circular reference"));
    map.insert(115, ErrorInfo::new(AmbiguousResolution, "Ambiguous implicit conversion"));
    map.insert(116, ErrorInfo::new(AccessViolation, "Private definition referenced"));
    map.insert(117, ErrorInfo::new(ProhibitedMember, "Prohibited element referenced"));
    map.insert(118, ErrorInfo::new(InvalidContext, "Invalid context reference"));
    map.insert(120, ErrorInfo::new(UnresolvedReference, "Invalid interval property"));

    // Model errors (0300-0399)
    map.insert(300, ErrorInfo::new(UnresolvedReference, "Model not found"));
    map.insert(
        301,
        ErrorInfo::new(ModelVersionConflict, "Model version conflict")
            .with_help("All libraries in one process must agree on the model version"),
    );
    map.insert(302, ErrorInfo::new(InvalidModel, "Invalid model definition"));

    // System errors (0400-0499)
    map.insert(400, ErrorInfo::new(InvalidState, "Invalid builder state"));
    map.insert(401, ErrorInfo::new(Serialization, "Serialization failure"));
    map.insert(402, ErrorInfo::new(Configuration, "Configuration error"));

    map
});

// Syntax errors
pub const CQL0001: ErrorCode = ErrorCode::new(1);

// Semantic errors
pub const CQL0100: ErrorCode = ErrorCode::new(100);
pub const CQL0101: ErrorCode = ErrorCode::new(101);
pub const CQL0102: ErrorCode = ErrorCode::new(102);
pub const CQL0103: ErrorCode = ErrorCode::new(103);
pub const CQL0104: ErrorCode = ErrorCode::new(104);
pub const CQL0105: ErrorCode = ErrorCode::new(105);
pub const CQL0106: ErrorCode = ErrorCode::new(106);
pub const CQL0107: ErrorCode = ErrorCode::new(107);
pub const CQL0109: ErrorCode = ErrorCode::new(109);
pub const CQL0110: ErrorCode = ErrorCode::new(110);
pub const CQL0111: ErrorCode = ErrorCode::new(111);
pub const CQL0112: ErrorCode = ErrorCode::new(112);
pub const CQL0113: ErrorCode = ErrorCode::new(113);
pub const CQL0114: ErrorCode = ErrorCode::new(114);
pub const CQL0115: ErrorCode = ErrorCode::new(115);
pub const CQL0116: ErrorCode = ErrorCode::new(116);
pub const CQL0117: ErrorCode = ErrorCode::new(117);
pub const CQL0118: ErrorCode = ErrorCode::new(118);
pub const CQL0120: ErrorCode = ErrorCode::new(120);

// Model errors
pub const CQL0300: ErrorCode = ErrorCode::new(300);
pub const CQL0301: ErrorCode = ErrorCode::new(301);
pub const CQL0302: ErrorCode = ErrorCode::new(302);

// System errors
pub const CQL0400: ErrorCode = ErrorCode::new(400);
pub const CQL0401: ErrorCode = ErrorCode::new(401);
pub const CQL0402: ErrorCode = ErrorCode::new(402);
