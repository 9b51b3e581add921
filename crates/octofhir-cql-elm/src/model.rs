//! ELM (Expression Logical Model) library structures
//!
//! The library document holds its definitions in the usual ELM containers.
//! Expressions live in the library's `ExprArena` and definitions refer to
//! them through `ExprId` handles.

use crate::expression::{ExprArena, ExprId};
use octofhir_cql_types::{AccessLevel, DataType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace of the ELM schema
pub const ELM_SCHEMA_ID: &str = "urn:hl7-org:elm";
/// Version of the ELM schema
pub const ELM_SCHEMA_VERSION: &str = "r1";

// ============================================================================
// Library Structure
// ============================================================================

/// ELM Library - the root element containing a compiled CQL library
#[derive(Debug, Clone)]
pub struct Library {
    /// Library identifier; absent for anonymous libraries
    pub identifier: Option<VersionedIdentifier>,
    /// Schema identifier
    pub schema_identifier: VersionedIdentifier,
    /// Using definitions
    pub usings: Option<UsingDefs>,
    /// Include definitions
    pub includes: Option<IncludeDefs>,
    /// Parameters
    pub parameters: Option<ParameterDefs>,
    /// Code systems
    pub code_systems: Option<CodeSystemDefs>,
    /// Value sets
    pub value_sets: Option<ValueSetDefs>,
    /// Codes
    pub codes: Option<CodeDefs>,
    /// Concepts
    pub concepts: Option<ConceptDefs>,
    /// Contexts
    pub contexts: Option<ContextDefs>,
    /// Statements (expression and function definitions)
    pub statements: Option<Statements>,
    /// Error annotations
    pub annotation: Vec<Annotation>,
    arena: ExprArena,
}

impl Default for Library {
    fn default() -> Self {
        Self {
            identifier: None,
            schema_identifier: VersionedIdentifier {
                id: ELM_SCHEMA_ID.to_string(),
                system: None,
                version: Some(ELM_SCHEMA_VERSION.to_string()),
            },
            usings: None,
            includes: None,
            parameters: None,
            code_systems: None,
            value_sets: None,
            codes: None,
            concepts: None,
            contexts: None,
            statements: None,
            annotation: Vec::new(),
            arena: ExprArena::default(),
        }
    }
}

impl Library {
    /// Create a new named library
    pub fn new(id: impl Into<String>, version: Option<impl Into<String>>) -> Self {
        Self {
            identifier: Some(VersionedIdentifier {
                id: id.into(),
                system: None,
                version: version.map(Into::into),
            }),
            ..Self::default()
        }
    }

    /// Create a library without identifier
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Expression nodes of this library
    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ExprArena {
        &mut self.arena
    }

    pub fn add_using(&mut self, def: UsingDef) {
        self.usings.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_include(&mut self, def: IncludeDef) {
        self.includes.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_parameter(&mut self, def: ParameterDef) {
        self.parameters.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_code_system(&mut self, def: CodeSystemDef) {
        self.code_systems.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_value_set(&mut self, def: ValueSetDef) {
        self.value_sets.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_code(&mut self, def: CodeDef) {
        self.codes.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_concept(&mut self, def: ConceptDef) {
        self.concepts.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_context(&mut self, def: ContextDef) {
        self.contexts.get_or_insert_with(Default::default).defs.push(def);
    }

    pub fn add_statement(&mut self, def: Statement) {
        self.statements.get_or_insert_with(Default::default).defs.push(def);
    }

    /// Append an error annotation
    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.annotation.push(annotation);
    }

    /// Using definitions in declaration order
    pub fn using_defs(&self) -> &[UsingDef] {
        self.usings.as_ref().map(|u| u.defs.as_slice()).unwrap_or(&[])
    }

    /// Statements in declaration order
    pub fn statement_defs(&self) -> &[Statement] {
        self.statements.as_ref().map(|s| s.defs.as_slice()).unwrap_or(&[])
    }

    /// Find an expression definition by name
    pub fn expression_def(&self, name: &str) -> Option<&ExpressionDef> {
        self.statement_defs().iter().find_map(|statement| match statement {
            Statement::Expression(def) if def.name == name => Some(def),
            _ => None,
        })
    }
}

/// Versioned identifier for libraries and schemas
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedIdentifier {
    /// Identifier
    pub id: String,
    /// System/namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl VersionedIdentifier {
    pub fn new(id: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            id: id.into(),
            system: None,
            version: version.map(String::from),
        }
    }
}

impl fmt::Display for VersionedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} version '{}'", self.id, version),
            None => write!(f, "{}", self.id),
        }
    }
}

// ============================================================================
// Definition Containers
// ============================================================================

/// Container for using definitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsingDefs {
    #[serde(rename = "def")]
    pub defs: Vec<UsingDef>,
}

/// Container for include definitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct IncludeDefs {
    #[serde(rename = "def")]
    pub defs: Vec<IncludeDef>,
}

/// Container for parameter definitions
#[derive(Debug, Clone, Default)]
pub struct ParameterDefs {
    pub defs: Vec<ParameterDef>,
}

/// Container for code system definitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct CodeSystemDefs {
    #[serde(rename = "def")]
    pub defs: Vec<CodeSystemDef>,
}

/// Container for value set definitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValueSetDefs {
    #[serde(rename = "def")]
    pub defs: Vec<ValueSetDef>,
}

/// Container for code definitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct CodeDefs {
    #[serde(rename = "def")]
    pub defs: Vec<CodeDef>,
}

/// Container for concept definitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConceptDefs {
    #[serde(rename = "def")]
    pub defs: Vec<ConceptDef>,
}

/// Container for context definitions
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextDefs {
    #[serde(rename = "def")]
    pub defs: Vec<ContextDef>,
}

/// Container for statements
#[derive(Debug, Clone, Default)]
pub struct Statements {
    pub defs: Vec<Statement>,
}

/// Expression or function definition
#[derive(Debug, Clone)]
pub enum Statement {
    Expression(ExpressionDef),
    Function(FunctionDef),
}

impl Statement {
    pub fn name(&self) -> &str {
        match self {
            Self::Expression(def) => &def.name,
            Self::Function(def) => &def.name,
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// Using definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsingDef {
    /// Local identifier
    pub local_identifier: String,
    /// Model URI
    pub uri: String,
    /// Model version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Include definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeDef {
    /// Local identifier
    pub local_identifier: String,
    /// Library path
    pub path: String,
    /// Library version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Parameter definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDef {
    /// Parameter name
    pub name: String,
    /// Access level
    pub access_level: AccessLevel,
    /// Parameter type specifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_type_specifier: Option<TypeSpecifier>,
    /// Default value expression
    #[serde(skip)]
    pub default: Option<ExprId>,
    /// Declared or inferred type
    #[serde(skip)]
    pub result_type: Option<DataType>,
}

/// Code system definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystemDef {
    /// Name
    pub name: String,
    /// Code system ID/URI
    pub id: String,
    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Access level
    pub access_level: AccessLevel,
}

/// Value set definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetDef {
    /// Name
    pub name: String,
    /// Value set ID/URI
    pub id: String,
    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Access level
    pub access_level: AccessLevel,
    /// Code systems
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub code_system: Vec<DefinitionRef>,
}

/// Code definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDef {
    /// Name
    pub name: String,
    /// Code value
    pub id: String,
    /// Display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Access level
    pub access_level: AccessLevel,
    /// Code system reference
    pub code_system: DefinitionRef,
}

/// Concept definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptDef {
    /// Name
    pub name: String,
    /// Display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Access level
    pub access_level: AccessLevel,
    /// Code references
    pub code: Vec<DefinitionRef>,
}

/// Context definition
#[derive(Debug, Clone, Serialize)]
pub struct ContextDef {
    /// Context name
    pub name: String,
}

/// Expression definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDef {
    /// Name
    pub name: String,
    /// Context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Access level
    pub access_level: AccessLevel,
    /// Expression
    #[serde(skip)]
    pub expression: Option<ExprId>,
    /// Declared or inferred type
    #[serde(skip)]
    pub result_type: Option<DataType>,
}

impl ExpressionDef {
    pub fn new(name: impl Into<String>, context: Option<&str>) -> Self {
        Self {
            name: name.into(),
            context: context.map(String::from),
            access_level: AccessLevel::Public,
            expression: None,
            result_type: None,
        }
    }
}

/// Function definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDef {
    /// Name
    pub name: String,
    /// Context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Access level
    pub access_level: AccessLevel,
    /// Whether fluent
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fluent: bool,
    /// Whether external
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
    /// Operands
    pub operand: Vec<OperandDef>,
    /// Return type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type_specifier: Option<TypeSpecifier>,
    /// Body
    #[serde(skip)]
    pub expression: Option<ExprId>,
    /// Declared or inferred return type
    #[serde(skip)]
    pub result_type: Option<DataType>,
    /// Exported as an implicit conversion of the declaring library
    #[serde(skip)]
    pub implicit_conversion: bool,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, operand: Vec<OperandDef>) -> Self {
        Self {
            name: name.into(),
            context: None,
            access_level: AccessLevel::Public,
            fluent: false,
            external: false,
            operand,
            result_type_specifier: None,
            expression: None,
            result_type: None,
            implicit_conversion: false,
        }
    }
}

/// Operand definition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperandDef {
    /// Name
    pub name: String,
    /// Operand type specifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operand_type_specifier: Option<TypeSpecifier>,
    /// Operand type
    #[serde(skip)]
    pub result_type: DataType,
}

impl OperandDef {
    pub fn new(name: impl Into<String>, result_type: DataType) -> Self {
        Self {
            name: name.into(),
            operand_type_specifier: None,
            result_type,
        }
    }
}

/// Reference to a terminology definition from another definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
}

impl DefinitionRef {
    pub fn new(name: impl Into<String>, library_name: Option<&str>) -> Self {
        Self {
            name: name.into(),
            library_name: library_name.map(String::from),
        }
    }
}

// ============================================================================
// Type Specifiers
// ============================================================================

/// Qualified name of a model type, rendered `{namespaceUri}localPart`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace_uri: String,
    pub local_part: String,
}

impl QName {
    pub fn new(namespace_uri: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            local_part: local_part.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace_uri, self.local_part)
    }
}

impl Serialize for QName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Type specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TypeSpecifier {
    /// Named type
    #[serde(rename = "NamedTypeSpecifier")]
    Named(NamedTypeSpecifier),
    /// List type
    #[serde(rename = "ListTypeSpecifier")]
    List(ListTypeSpecifier),
    /// Interval type
    #[serde(rename = "IntervalTypeSpecifier")]
    Interval(IntervalTypeSpecifier),
    /// Tuple type
    #[serde(rename = "TupleTypeSpecifier")]
    Tuple(TupleTypeSpecifier),
    /// Choice type
    #[serde(rename = "ChoiceTypeSpecifier")]
    Choice(ChoiceTypeSpecifier),
}

/// Named type specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedTypeSpecifier {
    /// Qualified type name
    pub name: QName,
}

/// List type specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTypeSpecifier {
    /// Element type
    pub element_type: Box<TypeSpecifier>,
}

/// Interval type specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalTypeSpecifier {
    /// Point type
    pub point_type: Box<TypeSpecifier>,
}

/// Tuple type specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TupleTypeSpecifier {
    /// Elements
    pub element: Vec<TupleElementDefinition>,
}

/// Tuple element definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleElementDefinition {
    /// Name
    pub name: String,
    /// Element type
    pub element_type: Box<TypeSpecifier>,
}

/// Choice type specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceTypeSpecifier {
    /// Choice types
    pub choice: Vec<TypeSpecifier>,
}

// ============================================================================
// Annotations
// ============================================================================

/// Library annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Annotation {
    /// Translation error mirrored into the library
    CqlToElmError(CqlToElmError),
}

/// Category of a recorded translation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Syntax,
    Semantic,
    Include,
    Internal,
}

/// Severity of a recorded translation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
}

/// Translation error annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CqlToElmError {
    pub message: String,
    pub error_type: ErrorType,
    pub error_severity: ErrorSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_char: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_char: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_include_library_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_include_library_version_id: Option<String>,
}

impl CqlToElmError {
    pub fn new(message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            message: message.into(),
            error_type,
            error_severity: ErrorSeverity::Error,
            library_id: None,
            library_version: None,
            start_line: None,
            start_char: None,
            end_line: None,
            end_char: None,
            target_include_library_id: None,
            target_include_library_version_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containers_created_on_demand() {
        let mut library = Library::new("Test", Some("1.0"));
        assert!(library.usings.is_none());
        library.add_using(UsingDef {
            local_identifier: "System".into(),
            uri: "urn:hl7-org:elm-types:r1".into(),
            version: None,
        });
        library.add_statement(Statement::Expression(ExpressionDef::new("Answer", Some("Patient"))));
        assert_eq!(library.using_defs().len(), 1);
        assert!(library.expression_def("Answer").is_some());
        assert!(library.expression_def("Other").is_none());
    }

    #[test]
    fn test_qname_display() {
        let name = QName::new("urn:hl7-org:elm-types:r1", "Integer");
        assert_eq!(name.to_string(), "{urn:hl7-org:elm-types:r1}Integer");
    }

    #[test]
    fn test_anonymous_library() {
        let library = Library::anonymous();
        assert!(library.identifier.is_none());
        assert_eq!(library.schema_identifier.version.as_deref(), Some("r1"));
    }
}
