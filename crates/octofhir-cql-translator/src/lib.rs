//! Semantic core of the CQL-to-ELM translator
//!
//! This crate provides:
//! - `LibraryBuilder`, which resolves identifiers, member accesses, type names
//!   and calls while a parse driver walks one library
//! - The scope stack searched during identifier resolution
//! - The System operator library and the conversion catalog it exports
//! - The `LibraryProvider` collaborator used to resolve included libraries

pub mod builder;
pub mod library;
pub mod options;
pub mod provider;
pub mod scope;
pub mod system;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{LibraryBuilder, LibraryBuilderConfig, Translation};
pub use library::{Definition, TranslatedLibrary};
pub use options::TranslatorOptions;
pub use provider::{InMemoryLibraryProvider, LibraryProvider};
pub use scope::{LetBinding, QueryContext, QuerySource, ScopeDepth, ScopeStack, THIS_ALIAS};
pub use system::{instantiate_result_type, system_library};
