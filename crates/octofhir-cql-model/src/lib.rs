//! CQL data model catalogs
//!
//! This crate provides:
//! - ModelInfo descriptions and their JSON parser
//! - Resolved `Model` type catalogs, including the built-in `System` model
//! - The `ModelProvider` collaborator trait
//! - The injected `ModelCache` shared across compilations

pub mod cache;
pub mod error;
pub mod model;
pub mod model_info;
pub mod provider;

pub use cache::*;
pub use error::*;
pub use model::*;
pub use model_info::*;
pub use provider::*;
