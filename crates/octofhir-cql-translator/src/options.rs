//! Translator options

use octofhir_cql_diagnostics::{CQL0402, CqlError, Result};
use serde::{Deserialize, Serialize};

/// Options of one library builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatorOptions {
    /// Context in which expressions are evaluated once per record
    pub record_context: String,
    /// Context in which expressions are evaluated once for the whole population
    pub population_context: String,
    /// Allow `T -> List<T>` implicit conversions
    pub enable_list_promotion: bool,
    /// Allow `List<T> -> T` implicit conversions
    pub enable_list_demotion: bool,
    /// Name reported to the library provider when the library has no identifier
    pub library_name: String,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            record_context: "Patient".to_string(),
            population_context: "Population".to_string(),
            enable_list_promotion: true,
            enable_list_demotion: true,
            library_name: "Anonymous".to_string(),
        }
    }
}

impl TranslatorOptions {
    /// Parse options from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CqlError::system(CQL0402, format!("Invalid translator options: {}", e)))
    }
}
