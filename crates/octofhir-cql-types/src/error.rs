//! Type system errors

use octofhir_cql_diagnostics::{
    CQL0109, CQL0113, CQL0115, CQL0117, CQL0120, CQL0302, CqlError,
};
use thiserror::Error;

/// Errors raised by type, conversion and overload queries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Element exists but may not be referenced
    #[error(
        "Element {member} cannot be referenced because it is marked prohibited in type {type_name}."
    )]
    ProhibitedMember { member: String, type_name: String },

    /// Interval types only expose low/high/lowClosed/highClosed
    #[error("Invalid interval property name {0}.")]
    InvalidIntervalProperty(String),

    /// Two conversions are equally good
    #[error("Ambiguous implicit conversion from {from} to {to}.")]
    AmbiguousConversion { from: String, to: String },

    /// Two signatures are equally good
    #[error("Call to operator {call} is ambiguous with: {}", .candidates.join(", "))]
    AmbiguousCall { call: String, candidates: Vec<String> },

    /// Same operator signature registered twice
    #[error("Operator {0} is already defined with this signature.")]
    DuplicateOperator(String),

    /// Elements of a named type can only be attached once
    #[error("Elements of type {0} are already defined.")]
    ElementsAlreadySet(String),
}

impl From<TypeError> for CqlError {
    fn from(err: TypeError) -> Self {
        let code = match &err {
            TypeError::ProhibitedMember { .. } => CQL0117,
            TypeError::InvalidIntervalProperty(_) => CQL0120,
            TypeError::AmbiguousConversion { .. } => CQL0115,
            TypeError::AmbiguousCall { .. } => CQL0113,
            TypeError::DuplicateOperator(_) => CQL0109,
            TypeError::ElementsAlreadySet(_) => return CqlError::model(CQL0302, err.to_string()),
        };
        CqlError::semantic(code, err.to_string())
    }
}
