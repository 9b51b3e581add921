//! The System library
//!
//! Built-in operators every compilation can call without an include, and the
//! conversion operators the System library exports. Operators over `Any`
//! stand for generic signatures; `instantiate_result_type` derives their
//! result from the actual operand types.

use crate::library::TranslatedLibrary;
use octofhir_cql_diagnostics::Result;
use octofhir_cql_elm::VersionedIdentifier;
use octofhir_cql_types::{
    Conversion, DataType, Operator, SYSTEM_NAMESPACE, Signature, SystemType,
};

use SystemType::{
    Boolean, Code, Concept, Date, DateTime, Decimal, Integer, Long, Quantity, String as Str, Time,
};

fn t(system: SystemType) -> DataType {
    system.data_type()
}

fn list(element: DataType) -> DataType {
    DataType::list(element)
}

fn interval(point: SystemType) -> DataType {
    DataType::interval(t(point))
}

struct SystemLibraryBuilder {
    library: TranslatedLibrary,
}

impl SystemLibraryBuilder {
    fn op(&mut self, name: &str, operands: Vec<DataType>, result: DataType) -> Result<()> {
        self.library.add_operator(
            Operator::new(name, Signature::new(operands), result).with_library(SYSTEM_NAMESPACE),
        )
    }

    fn unary(&mut self, name: &str, operand: SystemType, result: SystemType) -> Result<()> {
        self.op(name, vec![t(operand)], t(result))
    }

    fn binary(&mut self, name: &str, operand: SystemType, result: SystemType) -> Result<()> {
        self.op(name, vec![t(operand), t(operand)], t(result))
    }

    fn conversion(
        &mut self,
        name: &str,
        from: DataType,
        to: SystemType,
        implicit: bool,
    ) -> Result<()> {
        let operator =
            Operator::new(name, Signature::new(vec![from]), t(to)).with_library(SYSTEM_NAMESPACE);
        self.library.add_conversion(Conversion::operator(operator.clone(), implicit));
        self.library.add_operator(operator)
    }

    fn logical(&mut self) -> Result<()> {
        for name in ["And", "Or", "Xor", "Implies"] {
            self.binary(name, Boolean, Boolean)?;
        }
        self.unary("Not", Boolean, Boolean)?;
        self.op("IsNull", vec![DataType::Any], t(Boolean))?;
        self.unary("IsTrue", Boolean, Boolean)?;
        self.unary("IsFalse", Boolean, Boolean)?;
        self.op("Coalesce", vec![DataType::Any, DataType::Any], DataType::Any)?;
        self.op("Coalesce", vec![list(DataType::Any)], DataType::Any)
    }

    fn comparison(&mut self) -> Result<()> {
        for name in ["Equal", "NotEqual", "Equivalent"] {
            self.op(name, vec![DataType::Any, DataType::Any], t(Boolean))?;
        }
        for name in ["Less", "Greater", "LessOrEqual", "GreaterOrEqual"] {
            for operand in [Integer, Long, Decimal, Quantity, Str, Date, DateTime, Time] {
                self.binary(name, operand, Boolean)?;
            }
        }
        Ok(())
    }

    fn arithmetic(&mut self) -> Result<()> {
        for name in ["Add", "Subtract"] {
            for operand in [Integer, Long, Decimal, Quantity] {
                self.binary(name, operand, operand)?;
            }
            for temporal in [Date, DateTime, Time] {
                self.op(name, vec![t(temporal), t(Quantity)], t(temporal))?;
            }
        }
        for operand in [Integer, Long, Decimal, Quantity] {
            self.binary("Multiply", operand, operand)?;
            self.unary("Negate", operand, operand)?;
            self.unary("Abs", operand, operand)?;
        }
        self.binary("Divide", Decimal, Decimal)?;
        self.binary("Divide", Quantity, Quantity)?;
        for operand in [Integer, Long, Decimal] {
            self.binary("TruncatedDivide", operand, operand)?;
            self.binary("Modulo", operand, operand)?;
        }
        self.binary("Power", Integer, Integer)?;
        self.binary("Power", Decimal, Decimal)?;
        self.binary("Log", Decimal, Decimal)?;
        for name in ["Ceiling", "Floor", "Truncate"] {
            self.unary(name, Decimal, Integer)?;
        }
        self.unary("Ln", Decimal, Decimal)?;
        self.unary("Exp", Decimal, Decimal)?;
        for name in ["Successor", "Predecessor"] {
            for operand in [Integer, Long, Decimal, Date, DateTime, Time] {
                self.unary(name, operand, operand)?;
            }
        }
        Ok(())
    }

    fn string(&mut self) -> Result<()> {
        self.binary("Concatenate", Str, Str)?;
        self.unary("Length", Str, Integer)?;
        self.op("Length", vec![list(DataType::Any)], t(Integer))?;
        self.unary("Upper", Str, Str)?;
        self.unary("Lower", Str, Str)?;
        for name in ["StartsWith", "EndsWith", "Matches"] {
            self.binary(name, Str, Boolean)?;
        }
        self.op("Indexer", vec![t(Str), t(Integer)], t(Str))?;
        self.op("Indexer", vec![list(DataType::Any), t(Integer)], DataType::Any)
    }

    fn intervals(&mut self) -> Result<()> {
        for point in [Integer, Long, Decimal, Quantity, Date, DateTime, Time] {
            let iv = interval(point);
            self.op("Start", vec![iv.clone()], t(point))?;
            self.op("End", vec![iv.clone()], t(point))?;
            self.op("Contains", vec![iv.clone(), t(point)], t(Boolean))?;
            self.op("In", vec![t(point), iv.clone()], t(Boolean))?;
            self.op("Includes", vec![iv.clone(), iv.clone()], t(Boolean))?;
            self.op("IncludedIn", vec![iv.clone(), iv.clone()], t(Boolean))?;
            for name in ["Union", "Intersect", "Except"] {
                self.op(name, vec![iv.clone(), iv.clone()], iv.clone())?;
            }
        }
        for point in [Integer, Long, Decimal, Quantity] {
            self.op("Width", vec![interval(point)], t(point))?;
        }
        Ok(())
    }

    fn lists(&mut self) -> Result<()> {
        let any_list = list(DataType::Any);
        self.op("Exists", vec![any_list.clone()], t(Boolean))?;
        self.op("Flatten", vec![list(any_list.clone())], any_list.clone())?;
        self.op("Distinct", vec![any_list.clone()], any_list.clone())?;
        self.op("SingletonFrom", vec![any_list.clone()], DataType::Any)?;
        self.op("Contains", vec![any_list.clone(), DataType::Any], t(Boolean))?;
        self.op("In", vec![DataType::Any, any_list.clone()], t(Boolean))?;
        self.op("Includes", vec![any_list.clone(), any_list.clone()], t(Boolean))?;
        self.op("IncludedIn", vec![any_list.clone(), any_list.clone()], t(Boolean))?;
        for name in ["Union", "Intersect", "Except"] {
            self.op(name, vec![any_list.clone(), any_list.clone()], any_list.clone())?;
        }
        self.op("ToList", vec![DataType::Any], any_list)
    }

    fn aggregates(&mut self) -> Result<()> {
        self.op("Count", vec![list(DataType::Any)], t(Integer))?;
        for element in [Integer, Long, Decimal, Quantity] {
            self.op("Sum", vec![list(t(element))], t(element))?;
        }
        for element in [Integer, Long, Decimal, Quantity, Str, Date, DateTime, Time] {
            self.op("Min", vec![list(t(element))], t(element))?;
            self.op("Max", vec![list(t(element))], t(element))?;
        }
        self.op("Avg", vec![list(t(Decimal))], t(Decimal))?;
        self.op("Avg", vec![list(t(Quantity))], t(Quantity))?;
        self.op("AllTrue", vec![list(t(Boolean))], t(Boolean))?;
        self.op("AnyTrue", vec![list(t(Boolean))], t(Boolean))
    }

    fn conversions(&mut self) -> Result<()> {
        // Implicit
        self.conversion("ToDecimal", t(Integer), Decimal, true)?;
        self.conversion("ToDecimal", t(Long), Decimal, true)?;
        self.conversion("ToLong", t(Integer), Long, true)?;
        self.conversion("ToDateTime", t(Date), DateTime, true)?;
        self.conversion("ToQuantity", t(Integer), Quantity, true)?;
        self.conversion("ToQuantity", t(Decimal), Quantity, true)?;
        self.conversion("ToConcept", t(Code), Concept, true)?;

        // Explicit
        for from in [Boolean, Integer, Long, Decimal, Quantity, Date, DateTime, Time] {
            self.conversion("ToString", t(from), Str, false)?;
        }
        self.conversion("ToBoolean", t(Str), Boolean, false)?;
        self.conversion("ToBoolean", t(Integer), Boolean, false)?;
        self.conversion("ToInteger", t(Str), Integer, false)?;
        self.conversion("ToInteger", t(Boolean), Integer, false)?;
        self.conversion("ToLong", t(Str), Long, false)?;
        self.conversion("ToDecimal", t(Str), Decimal, false)?;
        self.conversion("ToDate", t(Str), Date, false)?;
        self.conversion("ToDate", t(DateTime), Date, false)?;
        self.conversion("ToDateTime", t(Str), DateTime, false)?;
        self.conversion("ToTime", t(Str), Time, false)?;
        self.conversion("ToQuantity", t(Str), Quantity, false)?;
        self.conversion("ToConcept", list(t(Code)), Concept, false)
    }
}

/// Build the System library
pub fn system_library() -> Result<TranslatedLibrary> {
    let mut builder = SystemLibraryBuilder {
        library: TranslatedLibrary::new(Some(VersionedIdentifier::new(SYSTEM_NAMESPACE, None))),
    };
    builder.logical()?;
    builder.comparison()?;
    builder.arithmetic()?;
    builder.string()?;
    builder.intervals()?;
    builder.lists()?;
    builder.aggregates()?;
    builder.conversions()?;
    Ok(builder.library)
}

/// Result type of a generic System operator applied to `operands`
///
/// Returns `None` for operators whose declared result type is already exact.
pub fn instantiate_result_type(operator: &Operator, operands: &[DataType]) -> Option<DataType> {
    if operator.library_name() != Some(SYSTEM_NAMESPACE) {
        return None;
    }
    let first = operands.first()?;
    match (operator.name(), operands.len()) {
        ("SingletonFrom", 1) => first.element_type().cloned(),
        ("Distinct", 1) if first.is_list() => Some(first.clone()),
        ("Flatten", 1) => first.element_type().filter(|e| e.is_list()).cloned(),
        ("Indexer", 2) => first.element_type().cloned(),
        ("ToList", 1) => Some(DataType::list(first.clone())),
        ("Coalesce", 1) => first.element_type().cloned(),
        ("Coalesce", 2) if operator.result_type().is_any() => Some(first.clone()),
        ("Union" | "Intersect" | "Except", 2) if first.is_list() => Some(first.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cql_types::{CallContext, ConversionMap};

    fn conversions(library: &TranslatedLibrary) -> ConversionMap {
        let mut map = ConversionMap::new();
        map.add_all(library.conversions());
        map
    }

    #[test]
    fn test_builds_without_duplicates() {
        let library = system_library().unwrap();
        assert_eq!(library.name(), Some("System"));
        assert!(library.operators().contains("Add"));
        assert!(library.operators().contains("ToConcept"));
        assert_eq!(library.conversions().iter().filter(|c| c.is_implicit()).count(), 7);
    }

    #[test]
    fn test_mixed_arithmetic_prefers_decimal() {
        let library = system_library().unwrap();
        let call = CallContext::new(None, "Add", Signature::new(vec![t(Integer), t(Decimal)]));
        let resolution = library.resolve_call(&call, &conversions(&library)).unwrap().unwrap();
        assert_eq!(resolution.operator().result_type(), &t(Decimal));
        assert!(resolution.conversions()[0].is_some());
    }

    #[test]
    fn test_integer_long_prefers_long() {
        let library = system_library().unwrap();
        let call = CallContext::new(None, "Add", Signature::new(vec![t(Integer), t(Long)]));
        let resolution = library.resolve_call(&call, &conversions(&library)).unwrap().unwrap();
        assert_eq!(resolution.operator().result_type(), &t(Long));
    }

    #[test]
    fn test_generic_result_types() {
        let library = system_library().unwrap();
        let singleton = &library.operators().overloads("SingletonFrom")[0];
        assert_eq!(
            instantiate_result_type(singleton, &[list(t(Str))]),
            Some(t(Str))
        );
        let flatten = &library.operators().overloads("Flatten")[0];
        assert_eq!(
            instantiate_result_type(flatten, &[list(list(t(Date)))]),
            Some(list(t(Date)))
        );
        let add = &library.operators().overloads("Add")[0];
        assert_eq!(instantiate_result_type(add, &[t(Integer), t(Integer)]), None);
    }
}
