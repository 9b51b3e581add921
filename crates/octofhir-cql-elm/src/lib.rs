//! CQL ELM (Expression Logical Model) representation
//!
//! This crate provides:
//! - The ELM library document and its definitions
//! - An arena of typed expression nodes addressed by `ExprId`
//! - Type specifiers and qualified names
//! - JSON serialization compatible with the HL7 ELM JSON shape

pub mod expression;
pub mod model;
pub mod serialize;

pub use expression::*;
pub use model::*;
pub use serialize::*;
