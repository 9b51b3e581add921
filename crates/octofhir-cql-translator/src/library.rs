//! Translated libraries
//!
//! A `TranslatedLibrary` is the resolution-side view of a library: its
//! definitions indexed by name, the operators of its functions and the
//! conversions it exports. Expression bodies stay in the ELM library's arena;
//! definitions only carry `ExprId` handles into it.

use indexmap::IndexMap;
use octofhir_cql_diagnostics::{CQL0106, CQL0109, CqlError, Result};
use octofhir_cql_elm::{
    CodeDef, CodeSystemDef, ConceptDef, ExpressionDef, FunctionDef, IncludeDef, ParameterDef,
    ValueSetDef, VersionedIdentifier,
};
use octofhir_cql_types::{
    AccessLevel, CallContext, Conversion, ConversionMap, DataType, Operator, OperatorMap,
    OperatorResolution, Signature, SystemType,
};

/// A named library-level definition
#[derive(Debug, Clone)]
pub enum Definition {
    Include(IncludeDef),
    Parameter(ParameterDef),
    CodeSystem(CodeSystemDef),
    ValueSet(ValueSetDef),
    Code(CodeDef),
    Concept(ConceptDef),
    Expression(ExpressionDef),
}

impl Definition {
    /// Name the definition is registered under
    pub fn name(&self) -> &str {
        match self {
            Self::Include(def) => &def.local_identifier,
            Self::Parameter(def) => &def.name,
            Self::CodeSystem(def) => &def.name,
            Self::ValueSet(def) => &def.name,
            Self::Code(def) => &def.name,
            Self::Concept(def) => &def.name,
            Self::Expression(def) => &def.name,
        }
    }

    /// Includes are always public
    pub fn access_level(&self) -> AccessLevel {
        match self {
            Self::Include(_) => AccessLevel::Public,
            Self::Parameter(def) => def.access_level,
            Self::CodeSystem(def) => def.access_level,
            Self::ValueSet(def) => def.access_level,
            Self::Code(def) => def.access_level,
            Self::Concept(def) => def.access_level,
            Self::Expression(def) => def.access_level,
        }
    }

    /// Declared type of a reference to this definition
    ///
    /// Expression types depend on the referencing context and are resolved by
    /// the builder.
    pub fn result_type(&self) -> Option<DataType> {
        match self {
            Self::Include(_) => None,
            Self::Parameter(def) => def.result_type.clone(),
            Self::CodeSystem(_) => Some(SystemType::CodeSystem.data_type()),
            Self::ValueSet(_) => Some(SystemType::ValueSet.data_type()),
            Self::Code(_) => Some(SystemType::Code.data_type()),
            Self::Concept(_) => Some(SystemType::Concept.data_type()),
            Self::Expression(def) => def.result_type.clone(),
        }
    }
}

/// Definitions, operators and exported conversions of one library
#[derive(Debug, Clone, Default)]
pub struct TranslatedLibrary {
    identifier: Option<VersionedIdentifier>,
    namespace: IndexMap<String, Definition>,
    operators: OperatorMap,
    conversions: Vec<Conversion>,
}

impl TranslatedLibrary {
    pub fn new(identifier: Option<VersionedIdentifier>) -> Self {
        Self {
            identifier,
            ..Self::default()
        }
    }

    pub fn identifier(&self) -> Option<&VersionedIdentifier> {
        self.identifier.as_ref()
    }

    pub fn set_identifier(&mut self, identifier: VersionedIdentifier) {
        self.identifier = Some(identifier);
    }

    /// Library id, if the library is named
    pub fn name(&self) -> Option<&str> {
        self.identifier.as_ref().map(|i| i.id.as_str())
    }

    /// Register a definition; names are unique per library
    pub fn add(&mut self, definition: Definition) -> Result<()> {
        let name = definition.name().to_string();
        if self.namespace.contains_key(&name) {
            return Err(CqlError::semantic(
                CQL0109,
                format!("Identifier {} is already in use in this library.", name),
            ));
        }
        self.namespace.insert(name, definition);
        Ok(())
    }

    /// Register a function as an operator overload
    ///
    /// Implicit conversion functions are also exported as conversions.
    pub fn add_function(&mut self, def: &FunctionDef) -> Result<()> {
        let result_type = def.result_type.clone().ok_or_else(|| {
            CqlError::semantic(
                CQL0106,
                format!("Could not determine the result type of function {}.", def.name),
            )
        })?;
        let signature = Signature::new(def.operand.iter().map(|o| o.result_type.clone()).collect());
        let mut operator = Operator::new(def.name.clone(), signature, result_type)
            .with_access_level(def.access_level);
        if let Some(name) = self.name() {
            operator = operator.with_library(name);
        }

        if def.implicit_conversion && def.operand.len() == 1 {
            self.conversions.push(Conversion::operator(operator.clone(), true));
        }
        self.operators.add_operator(operator)?;
        Ok(())
    }

    /// Register an operator directly
    pub fn add_operator(&mut self, operator: Operator) -> Result<()> {
        self.operators.add_operator(operator)?;
        Ok(())
    }

    /// Export a conversion
    pub fn add_conversion(&mut self, conversion: Conversion) {
        self.conversions.push(conversion);
    }

    /// Look a definition up by name
    pub fn resolve(&self, name: &str) -> Option<&Definition> {
        self.namespace.get(name)
    }

    /// Definitions in registration order
    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.namespace.values()
    }

    pub fn operators(&self) -> &OperatorMap {
        &self.operators
    }

    /// Conversions this library exports
    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    /// Find the best overload among this library's operators
    pub fn resolve_call(
        &self,
        call: &CallContext,
        conversions: &ConversionMap,
    ) -> Result<Option<OperatorResolution>> {
        Ok(self.operators.resolve_operator(call, conversions)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cql_diagnostics::ErrorKind;
    use octofhir_cql_elm::OperandDef;

    fn library() -> TranslatedLibrary {
        TranslatedLibrary::new(Some(VersionedIdentifier::new("Common", Some("1.0"))))
    }

    #[test]
    fn test_duplicate_name() {
        let mut library = library();
        library
            .add(Definition::Expression(ExpressionDef::new("Flag", Some("Patient"))))
            .unwrap();
        let err = library
            .add(Definition::Code(CodeDef {
                name: "Flag".into(),
                id: "123".into(),
                display: None,
                access_level: AccessLevel::Public,
                code_system: octofhir_cql_elm::DefinitionRef::new("LOINC", None),
            }))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateDefinition);
        assert_eq!(err.message(), "Identifier Flag is already in use in this library.");
    }

    #[test]
    fn test_function_overloads_and_exported_conversion() {
        let mut library = library();
        let string = SystemType::String.data_type();
        let integer = SystemType::Integer.data_type();

        let mut to_text =
            FunctionDef::new("ToText", vec![OperandDef::new("value", integer.clone())]);
        to_text.result_type = Some(string.clone());
        to_text.implicit_conversion = true;
        library.add_function(&to_text).unwrap();

        let mut to_text_bool = FunctionDef::new(
            "ToText",
            vec![OperandDef::new("value", SystemType::Boolean.data_type())],
        );
        to_text_bool.result_type = Some(string.clone());
        library.add_function(&to_text_bool).unwrap();

        assert_eq!(library.operators().overloads("ToText").len(), 2);
        assert_eq!(library.conversions().len(), 1);
        let conversion = &library.conversions()[0];
        assert_eq!(conversion.from_type(), &integer);
        assert_eq!(conversion.to_type(), &string);
        assert_eq!(
            conversion.operator_ref().and_then(|o| o.library_name()),
            Some("Common")
        );
    }

    #[test]
    fn test_function_without_result_type() {
        let mut library = library();
        let err = library
            .add_function(&FunctionDef::new("F", Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
    }

    #[test]
    fn test_terminology_types() {
        let value_set = Definition::ValueSet(ValueSetDef {
            name: "Diabetes".into(),
            id: "urn:oid:1.2.3".into(),
            version: None,
            access_level: AccessLevel::Private,
            code_system: Vec::new(),
        });
        assert_eq!(value_set.result_type(), Some(SystemType::ValueSet.data_type()));
        assert_eq!(value_set.access_level(), AccessLevel::Private);
    }
}
