//! CQL Type System
//!
//! This module defines the data types the library builder assigns to IR nodes:
//! - `DataType`, a closed sum over named, list, interval, tuple and choice shapes
//! - `NamedType`, a model-owned type with single inheritance and declared elements
//! - Subtype, compatibility and member-resolution queries

use crate::TypeError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// A data type as seen by the library builder
///
/// Equality is by qualified name for named types and structural for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// The Any type - supertype of all types
    Any,
    /// A named type owned by a model (System.Integer, FHIR.Patient, ...)
    Named(Arc<NamedType>),
    /// List of elements
    List(Box<DataType>),
    /// Interval between two points
    Interval(Box<DataType>),
    /// Tuple with named elements
    Tuple(TupleType),
    /// Choice of alternative types
    Choice(ChoiceType),
}

impl DataType {
    // === Constructors ===

    /// Wrap a named type
    pub fn named(named: NamedType) -> Self {
        Self::Named(Arc::new(named))
    }

    /// Create a list type
    pub fn list(element_type: DataType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create an interval type
    pub fn interval(point_type: DataType) -> Self {
        Self::Interval(Box::new(point_type))
    }

    /// Create a tuple type; elements are ordered by name
    pub fn tuple<N: Into<String>>(elements: impl IntoIterator<Item = (N, DataType)>) -> Self {
        Self::Tuple(TupleType::new(elements))
    }

    /// Create a choice type; a single distinct alternative collapses to that type
    pub fn choice(types: impl IntoIterator<Item = DataType>) -> Self {
        let choice = ChoiceType::new(types);
        if choice.types.len() == 1 {
            choice.types.into_iter().next().unwrap_or(DataType::Any)
        } else {
            Self::Choice(choice)
        }
    }

    // === Type Properties ===

    /// Check if this is the Any type
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Check if this is a list type
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Element type of a list
    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            Self::List(element) => Some(element),
            _ => None,
        }
    }

    /// Point type of an interval
    pub fn point_type(&self) -> Option<&DataType> {
        match self {
            Self::Interval(point) => Some(point),
            _ => None,
        }
    }

    /// The named type behind this data type, if any
    pub fn as_named(&self) -> Option<&NamedType> {
        match self {
            Self::Named(named) => Some(named),
            _ => None,
        }
    }

    /// Immediate base type; every type except Any derives from Any
    pub fn base_type(&self) -> Option<DataType> {
        match self {
            Self::Any => None,
            Self::Named(named) => Some(named.base_type().cloned().unwrap_or(DataType::Any)),
            _ => Some(DataType::Any),
        }
    }

    /// Qualified display name (System.Integer, List<FHIR.Patient>, ...)
    pub fn qualified_name(&self) -> String {
        match self {
            Self::Any => "System.Any".to_string(),
            Self::Named(named) => named.qualified_name(),
            Self::List(element) => format!("List<{}>", element.qualified_name()),
            Self::Interval(point) => format!("Interval<{}>", point.qualified_name()),
            Self::Tuple(tuple) => {
                let elements: Vec<String> = tuple
                    .elements
                    .iter()
                    .map(|e| format!("{}:{}", e.name, e.element_type.qualified_name()))
                    .collect();
                format!("Tuple{{{}}}", elements.join(","))
            }
            Self::Choice(choice) => {
                let types: Vec<String> =
                    choice.types.iter().map(DataType::qualified_name).collect();
                format!("Choice<{}>", types.join(","))
            }
        }
    }

    // === Type Relationships ===

    /// Check if this type is a supertype of (or equal to) another type
    ///
    /// - Any is the supertype of all types
    /// - A named type is a supertype of every type whose base chain reaches it
    /// - List, Interval and Tuple compare their components covariantly
    /// - A choice is a supertype of a choice whose alternatives it covers
    pub fn is_super_type_of(&self, other: &DataType) -> bool {
        if self == other {
            return true;
        }

        match self {
            DataType::Any => true,
            DataType::Named(_) => {
                let mut current = other.base_type();
                while let Some(base) = current {
                    if base == *self {
                        return true;
                    }
                    current = base.base_type();
                }
                false
            }
            DataType::List(element) => match other {
                DataType::List(other_element) => element.is_super_type_of(other_element),
                _ => false,
            },
            DataType::Interval(point) => match other {
                DataType::Interval(other_point) => point.is_super_type_of(other_point),
                _ => false,
            },
            DataType::Tuple(tuple) => match other {
                DataType::Tuple(other_tuple) => tuple.is_super_type_of(other_tuple),
                _ => false,
            },
            DataType::Choice(choice) => match other {
                DataType::Choice(other_choice) => choice.is_super_set_of(other_choice),
                _ => false,
            },
        }
    }

    /// Check if this type is a subtype of (or equal to) another type
    pub fn is_sub_type_of(&self, other: &DataType) -> bool {
        other.is_super_type_of(self)
    }

    /// Check whether a value of this type can be used where `other` is expected
    /// without a conversion
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        if self == other {
            return true;
        }

        match (self, other) {
            (DataType::Choice(choice), DataType::Choice(other_choice)) => {
                choice.is_super_set_of(other_choice) || other_choice.is_super_set_of(choice)
            }
            (DataType::Choice(choice), _) => {
                choice.types.iter().any(|t| other.is_compatible_with(t))
            }
            (_, DataType::Choice(other_choice)) => {
                other_choice.types.iter().any(|t| self.is_sub_type_of(t))
            }
            (DataType::List(element), DataType::List(other_element)) => {
                element.is_compatible_with(other_element)
            }
            (DataType::Interval(point), DataType::Interval(other_point)) => {
                point.is_compatible_with(other_point)
            }
            (DataType::Tuple(tuple), DataType::Tuple(other_tuple)) => {
                tuple.elements.len() == other_tuple.elements.len()
                    && tuple
                        .elements
                        .iter()
                        .zip(&other_tuple.elements)
                        .all(|(a, b)| {
                            a.name == b.name && a.element_type.is_compatible_with(&b.element_type)
                        })
            }
            _ => false,
        }
    }

    // === Member Resolution ===

    /// Resolve the type of a member, walking the base-type chain
    ///
    /// Returns `Ok(None)` when no such member exists. Prohibited class elements and
    /// unknown interval members are errors.
    pub fn resolve_property(&self, member: &str) -> Result<Option<DataType>, TypeError> {
        let mut current = Some(self.clone());
        while let Some(data_type) = current {
            match &data_type {
                DataType::Named(named) => {
                    if let Some(element) = named.element(member) {
                        if element.prohibited {
                            return Err(TypeError::ProhibitedMember {
                                member: member.to_string(),
                                type_name: named.qualified_name(),
                            });
                        }
                        return Ok(Some(element.element_type.clone()));
                    }
                }
                DataType::Tuple(tuple) => {
                    if let Some(element) = tuple.element(member) {
                        return Ok(Some(element.element_type.clone()));
                    }
                }
                DataType::Interval(point) => {
                    return match member {
                        "low" | "high" => Ok(Some(point.as_ref().clone())),
                        "lowClosed" | "highClosed" => {
                            Ok(Some(crate::SystemType::Boolean.data_type()))
                        }
                        _ => Err(TypeError::InvalidIntervalProperty(member.to_string())),
                    };
                }
                DataType::Choice(choice) => {
                    let mut found: Vec<DataType> = Vec::new();
                    for alternative in &choice.types {
                        if let Some(member_type) = alternative.resolve_property(member)? {
                            if !found.contains(&member_type) {
                                found.push(member_type);
                            }
                        }
                    }
                    return Ok(match found.len() {
                        0 => None,
                        _ => Some(DataType::choice(found)),
                    });
                }
                DataType::Any | DataType::List(_) => {}
            }
            current = match &data_type {
                DataType::Named(_) => data_type.base_type(),
                _ => None,
            };
        }
        Ok(None)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

impl Default for DataType {
    fn default() -> Self {
        Self::Any
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.qualified_name())
    }
}

// === Named Types ===

/// A named type declared by a model
///
/// Elements are attached once, possibly after construction, so that a model can
/// declare types whose elements refer back to types declared later.
pub struct NamedType {
    namespace: String,
    name: String,
    base_type: Option<DataType>,
    label: Option<String>,
    elements: OnceLock<Vec<ClassTypeElement>>,
}

impl NamedType {
    /// Create a named type with no elements attached yet
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        base_type: Option<DataType>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            base_type,
            label: None,
            elements: OnceLock::new(),
        }
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach elements at construction
    pub fn with_elements(self, elements: Vec<ClassTypeElement>) -> Self {
        let _ = self.elements.set(elements);
        self
    }

    /// Attach elements to an already shared type
    pub fn set_elements(&self, elements: Vec<ClassTypeElement>) -> Result<(), TypeError> {
        self.elements
            .set(elements)
            .map_err(|_| TypeError::ElementsAlreadySet(self.qualified_name()))
    }

    /// Model namespace (System, FHIR, ...)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Simple name without namespace
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace-qualified name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Declared base type, if any
    pub fn base_type(&self) -> Option<&DataType> {
        self.base_type.as_ref()
    }

    /// Display label
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Elements declared directly on this type
    pub fn elements(&self) -> &[ClassTypeElement] {
        self.elements.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find a directly declared element
    pub fn element(&self, name: &str) -> Option<&ClassTypeElement> {
        self.elements().iter().find(|e| e.name == name)
    }
}

impl PartialEq for NamedType {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

impl Eq for NamedType {}

impl Hash for NamedType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for NamedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedType").field(&self.qualified_name()).finish()
    }
}

/// Element declared on a named type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassTypeElement {
    /// Element name
    pub name: String,
    /// Element type
    pub element_type: DataType,
    /// Declared but not referenceable
    pub prohibited: bool,
}

impl ClassTypeElement {
    /// Create a referenceable element
    pub fn new(name: impl Into<String>, element_type: DataType) -> Self {
        Self {
            name: name.into(),
            element_type,
            prohibited: false,
        }
    }

    /// Create an element that may not be referenced
    pub fn prohibited(name: impl Into<String>, element_type: DataType) -> Self {
        Self {
            prohibited: true,
            ..Self::new(name, element_type)
        }
    }
}

// === Tuple Types ===

/// Tuple type with elements ordered by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleType {
    elements: Vec<TupleTypeElement>,
}

impl TupleType {
    /// Create a tuple type; duplicate names keep the last declaration
    pub fn new<N: Into<String>>(elements: impl IntoIterator<Item = (N, DataType)>) -> Self {
        let mut sorted: Vec<TupleTypeElement> = Vec::new();
        for (name, element_type) in elements {
            let name = name.into();
            sorted.retain(|e| e.name != name);
            sorted.push(TupleTypeElement { name, element_type });
        }
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        Self { elements: sorted }
    }

    /// Elements ordered by name
    pub fn elements(&self) -> &[TupleTypeElement] {
        &self.elements
    }

    /// Find an element by name
    pub fn element(&self, name: &str) -> Option<&TupleTypeElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    fn is_super_type_of(&self, other: &TupleType) -> bool {
        self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.name == b.name && a.element_type.is_super_type_of(&b.element_type))
    }
}

/// Tuple element definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleTypeElement {
    /// Element name
    pub name: String,
    /// Element type
    pub element_type: DataType,
}

// === Choice Types ===

/// Choice of alternative types
///
/// Nested choices are flattened, duplicates removed and alternatives kept in
/// qualified-name order so equality does not depend on declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChoiceType {
    types: Vec<DataType>,
}

impl ChoiceType {
    /// Create a normalized choice
    pub fn new(types: impl IntoIterator<Item = DataType>) -> Self {
        let mut flattened: Vec<DataType> = Vec::new();
        for data_type in types {
            let alternatives = match data_type {
                DataType::Choice(choice) => choice.types,
                other => vec![other],
            };
            for alternative in alternatives {
                if !flattened.contains(&alternative) {
                    flattened.push(alternative);
                }
            }
        }
        flattened.sort_by_key(DataType::qualified_name);
        Self { types: flattened }
    }

    /// Alternatives in normalized order
    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    /// Every alternative of `other` is covered by an alternative of this choice
    pub fn is_super_set_of(&self, other: &ChoiceType) -> bool {
        other
            .types
            .iter()
            .all(|t| self.types.iter().any(|a| a.is_super_type_of(t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SystemType;

    fn resource() -> DataType {
        DataType::named(NamedType::new("Test", "Resource", None).with_elements(vec![
            ClassTypeElement::new("id", SystemType::String.data_type()),
            ClassTypeElement::prohibited("secret", SystemType::String.data_type()),
        ]))
    }

    fn patient() -> DataType {
        DataType::named(
            NamedType::new("Test", "Patient", Some(resource())).with_elements(vec![
                ClassTypeElement::new("active", SystemType::Boolean.data_type()),
            ]),
        )
    }

    #[test]
    fn test_type_display() {
        assert_eq!(SystemType::Integer.data_type().to_string(), "System.Integer");
        assert_eq!(
            DataType::list(SystemType::String.data_type()).to_string(),
            "List<System.String>"
        );
        assert_eq!(
            DataType::tuple([("b", SystemType::Integer.data_type()), ("a", DataType::Any)])
                .to_string(),
            "Tuple{a:System.Any,b:System.Integer}"
        );
    }

    #[test]
    fn test_named_equality_by_name() {
        let a = DataType::named(NamedType::new("Test", "Patient", None));
        assert_eq!(a, patient());
        assert_ne!(a, DataType::named(NamedType::new("Other", "Patient", None)));
    }

    #[test]
    fn test_base_chain_subtyping() {
        assert!(resource().is_super_type_of(&patient()));
        assert!(!patient().is_super_type_of(&resource()));
        assert!(DataType::Any.is_super_type_of(&patient()));
        assert!(DataType::list(resource()).is_super_type_of(&DataType::list(patient())));
    }

    #[test]
    fn test_choice_compatibility() {
        let choice =
            DataType::choice([SystemType::Integer.data_type(), SystemType::String.data_type()]);
        assert!(SystemType::Integer.data_type().is_compatible_with(&choice));
        assert!(choice.is_compatible_with(&SystemType::String.data_type()));
        assert!(!SystemType::Boolean.data_type().is_compatible_with(&choice));
    }

    #[test]
    fn test_choice_normalization() {
        let a = DataType::choice([SystemType::String.data_type(), SystemType::Integer.data_type()]);
        let b = DataType::choice([
            SystemType::Integer.data_type(),
            DataType::choice([SystemType::String.data_type(), SystemType::Integer.data_type()]),
        ]);
        assert_eq!(a, b);
        assert_eq!(
            DataType::choice([SystemType::Date.data_type(), SystemType::Date.data_type()]),
            SystemType::Date.data_type()
        );
    }

    #[test]
    fn test_resolve_inherited_property() {
        assert_eq!(
            patient().resolve_property("id").unwrap(),
            Some(SystemType::String.data_type())
        );
        assert_eq!(
            patient().resolve_property("active").unwrap(),
            Some(SystemType::Boolean.data_type())
        );
        assert_eq!(patient().resolve_property("missing").unwrap(), None);
    }

    #[test]
    fn test_prohibited_property() {
        let err = patient().resolve_property("secret").unwrap_err();
        assert!(matches!(err, TypeError::ProhibitedMember { .. }));
    }

    #[test]
    fn test_late_elements() {
        let node = Arc::new(NamedType::new("Test", "Node", None));
        let node_type = DataType::Named(node.clone());
        node.set_elements(vec![ClassTypeElement::new("next", node_type.clone())])
            .unwrap();
        assert_eq!(node_type.resolve_property("next").unwrap(), Some(node_type.clone()));
        assert!(node.set_elements(Vec::new()).is_err());
    }
}
