//! ModelInfo structures describing a data model

use serde::{Deserialize, Serialize};

/// ModelInfo structure describing a data model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name (e.g., "FHIR"); also the namespace of its types
    pub name: String,
    /// Model version
    pub version: Option<String>,
    /// Model URL
    pub url: String,
    /// Patient class name
    pub patient_class_name: Option<String>,
    /// Type definitions in declaration order
    pub type_infos: Vec<TypeInfo>,
    /// Conversions the model exports
    pub conversion_infos: Vec<ConversionInfo>,
}

impl ModelInfo {
    /// Create a new ModelInfo
    pub fn new(name: impl Into<String>, version: Option<&str>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.map(String::from),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a type definition
    pub fn with_type(mut self, type_info: TypeInfo) -> Self {
        self.type_infos.push(type_info);
        self
    }

    /// Add a conversion definition
    pub fn with_conversion(mut self, conversion: ConversionInfo) -> Self {
        self.conversion_infos.push(conversion);
        self
    }

    /// Get type info by simple or qualified name
    pub fn get_type(&self, name: &str) -> Option<&TypeInfo> {
        let simple = self.simple_name(name);
        self.type_infos.iter().find(|t| self.simple_name(&t.name) == simple)
    }

    /// Strip this model's namespace prefix from a type name
    pub fn simple_name<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name)
    }
}

/// Type information for a model type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Type name, simple or qualified with the model name
    pub name: String,
    /// Base type name
    pub base_type: Option<String>,
    /// Display label, resolvable in place of the type name
    pub label: Option<String>,
    /// Whether this is retrievable
    pub retrievable: bool,
    /// Element definitions
    pub elements: Vec<ElementInfo>,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the base type
    pub fn with_base(mut self, base_type: impl Into<String>) -> Self {
        self.base_type = Some(base_type.into());
        self
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add an element
    pub fn with_element(mut self, element: ElementInfo) -> Self {
        self.elements.push(element);
        self
    }

    /// Get element by name
    pub fn get_element(&self, name: &str) -> Option<&ElementInfo> {
        self.elements.iter().find(|e| e.name == name)
    }
}

/// Element information within a type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Element name
    pub name: String,
    /// Element type reference (System.String, List<FHIR.HumanName>, ...)
    pub element_type: String,
    /// Declared but not referenceable
    pub prohibited: bool,
}

impl ElementInfo {
    pub fn new(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            element_type: element_type.into(),
            prohibited: false,
        }
    }

    /// Mark the element as not referenceable
    pub fn prohibited(mut self) -> Self {
        self.prohibited = true;
        self
    }
}

/// Conversion exported by a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionInfo {
    /// Source type reference
    pub from_type: String,
    /// Target type reference
    pub to_type: String,
    /// Backing function as `Library.Function`; absent for built-in coercions
    pub function_name: Option<String>,
    /// Whether the conversion may be applied implicitly
    pub implicit: bool,
}

impl ConversionInfo {
    /// Implicit conversion backed by `function_name`
    pub fn new(
        from_type: impl Into<String>,
        to_type: impl Into<String>,
        function_name: Option<&str>,
    ) -> Self {
        Self {
            from_type: from_type.into(),
            to_type: to_type.into(),
            function_name: function_name.map(String::from),
            implicit: true,
        }
    }
}
