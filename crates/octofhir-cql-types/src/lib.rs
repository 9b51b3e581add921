//! CQL type system
//!
//! This crate defines the type machinery of the library builder:
//! - Data types (named, list, interval, tuple, choice) and their relations
//! - The System types every compilation starts from
//! - The conversion catalog and its conversion search
//! - Operator signatures and cost-ranked overload resolution

mod conversion;
mod error;
mod operator;
mod system_types;
mod type_system;

pub use conversion::*;
pub use error::*;
pub use operator::*;
pub use system_types::*;
pub use type_system::*;
