//! ModelInfo description of a data model

pub mod parser;
pub mod types;

pub use parser::*;
pub use types::*;
