//! Shared fixtures for unit tests

use crate::builder::LibraryBuilder;
use crate::library::TranslatedLibrary;
use crate::provider::InMemoryLibraryProvider;
use octofhir_cql_elm::VersionedIdentifier;
use octofhir_cql_model::{ElementInfo, InMemoryModelProvider, ModelCache, ModelInfo, TypeInfo};
use octofhir_cql_types::DataType;
use std::sync::Arc;

pub fn test_model_info() -> ModelInfo {
    ModelInfo::new("Test", Some("1.0"), "http://example.org/test")
        .with_type(
            TypeInfo::new("Patient")
                .with_label("Person")
                .with_element(ElementInfo::new("birthDate", "System.Date"))
                .with_element(ElementInfo::new("name", "List<Test.HumanName>"))
                .with_element(ElementInfo::new("contact", "Test.Patient"))
                .with_element(ElementInfo::new("secret", "System.String").prohibited()),
        )
        .with_type(
            TypeInfo::new("HumanName")
                .with_element(ElementInfo::new("family", "System.String"))
                .with_element(ElementInfo::new("given", "List<System.String>")),
        )
}

fn builder(
    provider: InMemoryLibraryProvider,
    identifier: Option<VersionedIdentifier>,
) -> LibraryBuilder {
    let models = InMemoryModelProvider::new().with_model_info(test_model_info());
    let mut builder = LibraryBuilder::builder()
        .model_cache(Arc::new(ModelCache::new(Arc::new(models))))
        .library_provider(Arc::new(provider))
        .build()
        .unwrap();
    if let Some(identifier) = identifier {
        builder.set_library_identifier(identifier);
    }
    builder.begin_translation().unwrap();
    builder.get_model("Test", Some("1.0")).unwrap();
    builder
}

/// Anonymous library using the `Test` model
pub fn builder_with_models() -> LibraryBuilder {
    builder(InMemoryLibraryProvider::new(), None)
}

/// Library `Main` that can include `library`
pub fn builder_with_library(library: TranslatedLibrary) -> LibraryBuilder {
    builder(
        InMemoryLibraryProvider::new().with_library(library),
        Some(VersionedIdentifier::new("Main", Some("1.0"))),
    )
}

pub fn patient_type(builder: &LibraryBuilder) -> DataType {
    builder.require_type_name(Some("Test"), "Patient").unwrap()
}
