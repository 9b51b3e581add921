//! Referenced-library resolution
//!
//! Includes are resolved through a `LibraryProvider`. Resolution failures are
//! appended to the caller's diagnostics instead of being returned, so one
//! missing include does not stop the translation of the including library.

use crate::library::TranslatedLibrary;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use octofhir_cql_diagnostics::{CQL0103, CQL0114, CqlError, Result};
use octofhir_cql_elm::VersionedIdentifier;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Source of previously translated libraries
pub trait LibraryProvider: Send + Sync {
    /// Resolve an included library, recording failures in `errors`
    fn resolve_library(
        &self,
        identifier: &VersionedIdentifier,
        errors: &mut Vec<CqlError>,
    ) -> Option<Arc<TranslatedLibrary>>;

    /// Called when translation of `library_name` starts
    fn begin_translation(&self, _library_name: &str) -> Result<()> {
        Ok(())
    }

    /// Called when translation of `library_name` ends
    fn end_translation(&self, _library_name: &str) {}
}

/// Provider over libraries registered in memory
///
/// Libraries being translated are tracked so that an include of a library
/// whose translation is still in progress is reported as circular.
#[derive(Debug, Default)]
pub struct InMemoryLibraryProvider {
    libraries: RwLock<IndexMap<String, Arc<TranslatedLibrary>>>,
    translating: Mutex<IndexSet<String>>,
}

impl InMemoryLibraryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a translated library under its id
    ///
    /// Anonymous libraries cannot be included and are ignored.
    pub fn register(&self, library: Arc<TranslatedLibrary>) {
        if let Some(name) = library.name() {
            debug!("Registering library {}", name);
            self.libraries.write().insert(name.to_string(), library);
        }
    }

    /// Builder-style variant of `register`
    pub fn with_library(self, library: TranslatedLibrary) -> Self {
        self.register(Arc::new(library));
        self
    }
}

impl LibraryProvider for InMemoryLibraryProvider {
    fn resolve_library(
        &self,
        identifier: &VersionedIdentifier,
        errors: &mut Vec<CqlError>,
    ) -> Option<Arc<TranslatedLibrary>> {
        if self.translating.lock().contains(&identifier.id) {
            errors.push(CqlError::include(
                CQL0114,
                format!("Circular library reference {}.", identifier.id),
                identifier.id.clone(),
                identifier.version.clone(),
            ));
            return None;
        }

        let library = self.libraries.read().get(&identifier.id).cloned();
        let found = library.filter(|library| match (&identifier.version, library.identifier()) {
            (Some(requested), Some(registered)) => registered.version.as_ref() == Some(requested),
            _ => true,
        });

        if found.is_none() {
            errors.push(CqlError::include(
                CQL0103,
                format!("Could not load source for library {}.", identifier),
                identifier.id.clone(),
                identifier.version.clone(),
            ));
        }
        found
    }

    fn begin_translation(&self, library_name: &str) -> Result<()> {
        debug!("Begin translation of {}", library_name);
        if !self.translating.lock().insert(library_name.to_string()) {
            return Err(CqlError::semantic(
                CQL0114,
                format!("Circular library reference {}.", library_name),
            ));
        }
        Ok(())
    }

    fn end_translation(&self, library_name: &str) {
        debug!("End translation of {}", library_name);
        self.translating.lock().shift_remove(library_name);
    }
}
