//! Operator signatures and overload resolution
//!
//! Every library exposes its operators and functions through an `OperatorMap`.
//! Resolution ranks each candidate with a matching arity by the summed cost of
//! the per-operand conversions it needs; the cheapest candidate wins and a tie
//! is an ambiguity.

use crate::{Conversion, ConversionMap, DataType, TypeError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cost of an operand whose type is a proper subtype of the parameter
const SUBTYPE_COST: u32 = 1;
/// Cost of an operand that is compatible with the parameter without conversion
const COMPATIBLE_COST: u32 = 2;

/// Visibility of a library-level definition to other libraries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    /// Visible from any library
    #[default]
    Public,
    /// Visible only inside the declaring library
    Private,
}

/// Ordered operand types of an operator or an invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    operand_types: Vec<DataType>,
}

impl Signature {
    pub fn new(operand_types: Vec<DataType>) -> Self {
        Self { operand_types }
    }

    pub fn operand_types(&self) -> &[DataType] {
        &self.operand_types
    }

    pub fn len(&self) -> usize {
        self.operand_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operand_types.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<String> = self.operand_types.iter().map(DataType::qualified_name).collect();
        write!(f, "({})", types.join(","))
    }
}

/// A resolvable operator or function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    library_name: Option<String>,
    name: String,
    signature: Signature,
    result_type: DataType,
    access_level: AccessLevel,
}

impl Operator {
    /// Create a public operator not yet attached to a library
    pub fn new(name: impl Into<String>, signature: Signature, result_type: DataType) -> Self {
        Self {
            library_name: None,
            name: name.into(),
            signature,
            result_type,
            access_level: AccessLevel::Public,
        }
    }

    /// Set the declaring library
    pub fn with_library(mut self, library_name: impl Into<String>) -> Self {
        self.library_name = Some(library_name.into());
        self
    }

    /// Set the access level
    pub fn with_access_level(mut self, access_level: AccessLevel) -> Self {
        self.access_level = access_level;
        self
    }

    pub fn library_name(&self) -> Option<&str> {
        self.library_name.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn result_type(&self) -> &DataType {
        &self.result_type
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(library) = &self.library_name {
            write!(f, "{}.", library)?;
        }
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// Key of a call search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Library qualifier, if the call was written qualified
    pub library_name: Option<String>,
    /// Operator or function name
    pub operator_name: String,
    /// Actual operand types
    pub signature: Signature,
}

impl CallContext {
    pub fn new(
        library_name: Option<String>,
        operator_name: impl Into<String>,
        signature: Signature,
    ) -> Self {
        Self {
            library_name,
            operator_name: operator_name.into(),
            signature,
        }
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(library) = &self.library_name {
            write!(f, "{}.", library)?;
        }
        write!(f, "{}{}", self.operator_name, self.signature)
    }
}

/// Outcome of a successful call search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorResolution {
    operator: Operator,
    conversions: Vec<Option<Conversion>>,
    score: u32,
}

impl OperatorResolution {
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Per operand position, the conversion to apply, if any
    pub fn conversions(&self) -> &[Option<Conversion>] {
        &self.conversions
    }

    pub fn has_conversions(&self) -> bool {
        self.conversions.iter().any(Option::is_some)
    }

    /// Total ranking cost; zero for an exact match
    pub fn score(&self) -> u32 {
        self.score
    }
}

/// Operators of one library, grouped by name
#[derive(Debug, Clone, Default)]
pub struct OperatorMap {
    operators: IndexMap<String, Vec<Operator>>,
}

impl OperatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator; the same name and signature may only appear once
    pub fn add_operator(&mut self, operator: Operator) -> Result<(), TypeError> {
        let overloads = self.operators.entry(operator.name.clone()).or_default();
        if overloads.iter().any(|o| o.signature == operator.signature) {
            return Err(TypeError::DuplicateOperator(operator.to_string()));
        }
        overloads.push(operator);
        Ok(())
    }

    /// Check whether any overload of `name` exists
    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// All overloads of `name`
    pub fn overloads(&self, name: &str) -> &[Operator] {
        self.operators.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over every registered operator
    pub fn iter(&self) -> impl Iterator<Item = &Operator> {
        self.operators.values().flatten()
    }

    /// Find the best overload for `call`
    ///
    /// Returns `Ok(None)` when no overload matches.
    pub fn resolve_operator(
        &self,
        call: &CallContext,
        conversions: &ConversionMap,
    ) -> Result<Option<OperatorResolution>, TypeError> {
        let mut candidates: Vec<OperatorResolution> = Vec::new();

        for operator in self.overloads(&call.operator_name) {
            if operator.signature.len() != call.signature.len() {
                continue;
            }
            let resolution = Self::match_signature(operator, &call.signature, conversions)?;
            if let Some(resolution) = resolution {
                candidates.push(resolution);
            }
        }

        let Some(best_score) = candidates.iter().map(|c| c.score).min() else {
            return Ok(None);
        };

        let mut best: Vec<OperatorResolution> =
            candidates.into_iter().filter(|c| c.score == best_score).collect();
        if best.len() > 1 {
            return Err(TypeError::AmbiguousCall {
                call: call.to_string(),
                candidates: best.iter().map(|c| c.operator.to_string()).collect(),
            });
        }
        Ok(best.pop())
    }

    fn match_signature(
        operator: &Operator,
        actual: &Signature,
        conversions: &ConversionMap,
    ) -> Result<Option<OperatorResolution>, TypeError> {
        let mut score = 0;
        let mut operand_conversions = Vec::with_capacity(actual.len());

        let parameters = &operator.signature.operand_types;
        for (argument, parameter) in actual.operand_types.iter().zip(parameters) {
            if argument == parameter {
                operand_conversions.push(None);
            } else if parameter.is_super_type_of(argument) {
                score += SUBTYPE_COST;
                operand_conversions.push(None);
            } else if argument.is_compatible_with(parameter) {
                score += COMPATIBLE_COST;
                operand_conversions.push(None);
            } else if let Some(conversion) =
                conversions.find_conversion(argument, parameter, true)?
            {
                score += conversion.cost();
                operand_conversions.push(Some(conversion));
            } else {
                return Ok(None);
            }
        }

        Ok(Some(OperatorResolution {
            operator: operator.clone(),
            conversions: operand_conversions,
            score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConversionKind, SystemType};

    fn t(system: SystemType) -> DataType {
        system.data_type()
    }

    fn arithmetic() -> (OperatorMap, ConversionMap) {
        let mut operators = OperatorMap::new();
        for ty in [SystemType::Integer, SystemType::Decimal, SystemType::Quantity] {
            operators
                .add_operator(Operator::new("Add", Signature::new(vec![t(ty), t(ty)]), t(ty)))
                .unwrap();
        }

        let mut conversions = ConversionMap::new();
        for (name, from, to) in [
            ("ToDecimal", SystemType::Integer, SystemType::Decimal),
            ("ToQuantity", SystemType::Integer, SystemType::Quantity),
            ("ToQuantity", SystemType::Decimal, SystemType::Quantity),
        ] {
            let operator = Operator::new(name, Signature::new(vec![t(from)]), t(to));
            conversions.add(Conversion::operator(operator, true));
        }
        (operators, conversions)
    }

    fn add_call(left: SystemType, right: SystemType) -> CallContext {
        CallContext::new(None, "Add", Signature::new(vec![t(left), t(right)]))
    }

    #[test]
    fn test_exact_match() {
        let (operators, conversions) = arithmetic();
        let resolution = operators
            .resolve_operator(&add_call(SystemType::Integer, SystemType::Integer), &conversions)
            .unwrap()
            .unwrap();
        assert_eq!(resolution.score(), 0);
        assert!(!resolution.has_conversions());
        assert_eq!(resolution.operator().result_type(), &t(SystemType::Integer));
    }

    #[test]
    fn test_cheapest_conversion_wins() {
        let (operators, conversions) = arithmetic();
        let resolution = operators
            .resolve_operator(&add_call(SystemType::Integer, SystemType::Decimal), &conversions)
            .unwrap()
            .unwrap();
        assert_eq!(resolution.operator().result_type(), &t(SystemType::Decimal));
        let first = resolution.conversions()[0].as_ref().unwrap();
        assert_eq!(first.kind(), ConversionKind::Operator);
        assert!(resolution.conversions()[1].is_none());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let (operators, conversions) = arithmetic();
        let call = add_call(SystemType::Integer, SystemType::Decimal);
        let first = operators.resolve_operator(&call, &conversions).unwrap();
        let second = operators.resolve_operator(&call, &conversions).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_match() {
        let (operators, conversions) = arithmetic();
        let call = add_call(SystemType::String, SystemType::Integer);
        assert!(operators.resolve_operator(&call, &conversions).unwrap().is_none());
        let unary = CallContext::new(None, "Add", Signature::new(vec![t(SystemType::Integer)]));
        assert!(operators.resolve_operator(&unary, &conversions).unwrap().is_none());
    }

    #[test]
    fn test_tie_is_ambiguous() {
        let mut operators = OperatorMap::new();
        let string = t(SystemType::String);
        for operands in [
            vec![string.clone(), DataType::Any],
            vec![DataType::Any, string.clone()],
        ] {
            let operator = Operator::new("F", Signature::new(operands), string.clone());
            operators.add_operator(operator).unwrap();
        }
        let call = CallContext::new(None, "F", Signature::new(vec![string.clone(), string]));
        let err = operators.resolve_operator(&call, &ConversionMap::new()).unwrap_err();
        assert!(matches!(
            err,
            TypeError::AmbiguousCall { ref candidates, .. } if candidates.len() == 2
        ));
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let mut operators = OperatorMap::new();
        let op = Operator::new("F", Signature::new(vec![DataType::Any]), DataType::Any);
        operators.add_operator(op.clone()).unwrap();
        assert!(operators.add_operator(op).is_err());
    }

    #[test]
    fn test_call_display() {
        let signature = Signature::new(vec![t(SystemType::Integer)]);
        let call = CallContext::new(Some("Common".into()), "Add", signature);
        assert_eq!(call.to_string(), "Common.Add(System.Integer)");
    }
}
