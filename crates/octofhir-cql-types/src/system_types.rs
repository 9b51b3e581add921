//! CQL System types

use crate::{ClassTypeElement, DataType, NamedType};
use serde::{Deserialize, Serialize};

/// Namespace of the built-in types
pub const SYSTEM_NAMESPACE: &str = "System";

/// Model url of the built-in types
pub const SYSTEM_MODEL_URL: &str = "urn:hl7-org:elm-types:r1";

/// CQL System types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemType {
    /// Any type (top type)
    Any,
    /// Boolean type
    Boolean,
    /// Integer type (32-bit signed)
    Integer,
    /// Long type (64-bit signed)
    Long,
    /// Decimal type (arbitrary precision)
    Decimal,
    /// String type
    String,
    /// Date type
    Date,
    /// DateTime type
    DateTime,
    /// Time type
    Time,
    /// Quantity type
    Quantity,
    /// Ratio type
    Ratio,
    /// Code type
    Code,
    /// Concept type
    Concept,
    /// Vocabulary type (codesystem/valueset)
    Vocabulary,
    /// Value set reference
    ValueSet,
    /// Code system reference
    CodeSystem,
}

impl SystemType {
    /// Every System type in declaration order
    pub const ALL: [SystemType; 16] = [
        Self::Any,
        Self::Boolean,
        Self::Integer,
        Self::Long,
        Self::Decimal,
        Self::String,
        Self::Date,
        Self::DateTime,
        Self::Time,
        Self::Quantity,
        Self::Ratio,
        Self::Code,
        Self::Concept,
        Self::Vocabulary,
        Self::ValueSet,
        Self::CodeSystem,
    ];

    /// Get the simple name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::Long => "Long",
            Self::Decimal => "Decimal",
            Self::String => "String",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Time => "Time",
            Self::Quantity => "Quantity",
            Self::Ratio => "Ratio",
            Self::Code => "Code",
            Self::Concept => "Concept",
            Self::Vocabulary => "Vocabulary",
            Self::ValueSet => "ValueSet",
            Self::CodeSystem => "CodeSystem",
        }
    }

    /// Look a System type up by its simple name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Get the full qualified name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", SYSTEM_NAMESPACE, self.name())
    }

    /// Declared base type
    pub const fn base(&self) -> Option<SystemType> {
        match self {
            Self::Any => None,
            Self::ValueSet | Self::CodeSystem => Some(Self::Vocabulary),
            _ => Some(Self::Any),
        }
    }

    /// Check if this type is numeric
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Decimal)
    }

    /// Check if this type is temporal
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::Time)
    }

    /// Build the data type, including declared elements
    ///
    /// Named types compare by name, so every call yields an equal value.
    pub fn data_type(&self) -> DataType {
        if let Self::Any = self {
            return DataType::Any;
        }
        let base = self.base().map(|b| b.data_type());
        DataType::named(
            NamedType::new(SYSTEM_NAMESPACE, self.name(), base).with_elements(self.elements()),
        )
    }

    fn elements(&self) -> Vec<ClassTypeElement> {
        let string = || Self::String.data_type();
        match self {
            Self::Quantity => vec![
                ClassTypeElement::new("value", Self::Decimal.data_type()),
                ClassTypeElement::new("unit", string()),
            ],
            Self::Ratio => vec![
                ClassTypeElement::new("numerator", Self::Quantity.data_type()),
                ClassTypeElement::new("denominator", Self::Quantity.data_type()),
            ],
            Self::Code => vec![
                ClassTypeElement::new("code", string()),
                ClassTypeElement::new("system", string()),
                ClassTypeElement::new("version", string()),
                ClassTypeElement::new("display", string()),
            ],
            Self::Concept => vec![
                ClassTypeElement::new("codes", DataType::list(Self::Code.data_type())),
                ClassTypeElement::new("display", string()),
            ],
            Self::Vocabulary => vec![
                ClassTypeElement::new("id", string()),
                ClassTypeElement::new("version", string()),
                ClassTypeElement::new("name", string()),
            ],
            _ => Vec::new(),
        }
    }
}
