//! Translator diagnostics and error handling
//!
//! This crate provides the error handling infrastructure for the CQL-to-ELM
//! library builder: error codes with their taxonomy and ELM-style source
//! locators.

mod error;
mod error_code;
mod locator;

pub use error::*;
pub use error_code::*;
pub use locator::*;

/// Result type for translator operations
pub type Result<T> = std::result::Result<T, CqlError>;
