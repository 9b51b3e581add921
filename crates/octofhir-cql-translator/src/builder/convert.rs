//! Conversion application and type checks

use super::LibraryBuilder;
use log::trace;
use octofhir_cql_diagnostics::{CQL0110, CQL0111, CQL0400, CqlError, Result};
use octofhir_cql_elm::{
    AliasedQuerySource, ChoiceTypeSpecifier, ExprId, ExprKind, IntervalSelector,
    IntervalTypeSpecifier, ListTypeSpecifier, NamedTypeSpecifier, NativeOperator, QName, Query,
    ReturnClause, TupleElementDefinition, TupleTypeSpecifier, TypeSpecifier,
};
use octofhir_cql_types::{
    Conversion, ConversionKind, DataType, SYSTEM_MODEL_URL, SYSTEM_NAMESPACE, SystemType,
};
use smallvec::smallvec;

/// Alias of the query that converts list elements
const ELEMENT_ALIAS: &str = "X";

impl LibraryBuilder {
    /// Wrap `expression` in the nodes that perform `conversion`
    pub fn convert_expression(
        &mut self,
        expression: ExprId,
        conversion: &Conversion,
    ) -> Result<ExprId> {
        trace!("Applying conversion {}", conversion);
        match conversion.kind() {
            ConversionKind::Cast => self.apply_cast(expression, conversion),
            ConversionKind::ListElement => {
                let element = required_nested(conversion)?;
                self.convert_list_elements(expression, conversion.to_type(), element)
            }
            ConversionKind::ListDemotion => {
                let singleton =
                    self.resolve_native(NativeOperator::SingletonFrom, vec![expression])?;
                match conversion.nested() {
                    Some(nested) => self.convert_expression(singleton, nested),
                    None => Ok(singleton),
                }
            }
            ConversionKind::ListPromotion => {
                let element = match conversion.nested() {
                    Some(nested) => self.convert_expression(expression, nested)?,
                    None => expression,
                };
                let element_type = self.arena().result_type(element).cloned().unwrap_or_default();
                Ok(self.alloc_typed(
                    ExprKind::List {
                        elements: vec![element],
                    },
                    DataType::list(element_type),
                ))
            }
            ConversionKind::Interval => {
                let point = required_nested(conversion)?;
                self.convert_interval(expression, conversion.to_type(), point)
            }
            ConversionKind::Operator => {
                let operator = conversion
                    .operator_ref()
                    .ok_or_else(|| invalid_conversion(conversion))?;
                let library_name = operator.library_name().map(String::from);
                let name = operator.name().to_string();
                self.resolve_function(library_name.as_deref(), &name, vec![expression])
            }
            ConversionKind::Primitive => self.apply_primitive(expression, conversion.to_type()),
        }
    }

    /// Convert `expression` to `target_type` if it is not already of that type
    pub fn convert_to(
        &mut self,
        expression: ExprId,
        target_type: &DataType,
        implicit: bool,
    ) -> Result<ExprId> {
        let actual = self.arena().result_type(expression).cloned().unwrap_or_default();
        if target_type.is_super_type_of(&actual) {
            return Ok(expression);
        }
        let conversion = self.conversions.find_conversion(&actual, target_type, implicit)?;
        if let Some(conversion) = conversion {
            return self.convert_expression(expression, &conversion);
        }
        self.verify_type(&actual, target_type)?;
        Ok(expression)
    }

    /// Implicitly convert `expression` unless `target_type` already admits it
    pub fn ensure_compatible(
        &mut self,
        expression: ExprId,
        target_type: &DataType,
    ) -> Result<ExprId> {
        self.convert_to(expression, target_type, true)
    }

    /// Common type of two operands, e.g. the branches of a conditional
    ///
    /// `Any` yields to the other side, so `if c then 1 else null` is an Integer.
    pub fn ensure_compatible_types(
        &self,
        first: &DataType,
        second: &DataType,
    ) -> Result<DataType> {
        if first.is_any() {
            return Ok(second.clone());
        }
        if second.is_any() {
            return Ok(first.clone());
        }
        if first.is_super_type_of(second) || second.is_compatible_with(first) {
            return Ok(first.clone());
        }
        if second.is_super_type_of(first) || first.is_compatible_with(second) {
            return Ok(second.clone());
        }
        if self.conversions.find_conversion(second, first, true)?.is_some() {
            return Ok(first.clone());
        }
        if self.conversions.find_conversion(first, second, true)?.is_some() {
            return Ok(second.clone());
        }
        self.verify_type(second, first)?;
        Ok(first.clone())
    }

    /// Fail unless a value of `actual` may be used where `expected` is required
    ///
    /// An implicit conversion from `actual` to `expected` is accepted.
    pub fn verify_type(&self, actual: &DataType, expected: &DataType) -> Result<()> {
        if expected.is_super_type_of(actual) || actual.is_compatible_with(expected) {
            return Ok(());
        }
        if self.conversions.find_conversion(actual, expected, true)?.is_some() {
            return Ok(());
        }
        Err(CqlError::semantic(
            CQL0110,
            format!(
                "Expected an expression of type '{}', but found an expression of type '{}'.",
                expected, actual
            ),
        ))
    }

    /// Qualified ELM name of a named type
    pub fn data_type_to_qname(&self, data_type: &DataType) -> Result<QName> {
        if data_type.is_any() {
            return Ok(QName::new(SYSTEM_MODEL_URL, SystemType::Any.name()));
        }
        let named = data_type.as_named().ok_or_else(|| {
            CqlError::semantic(CQL0111, "A named type is required in this context.")
        })?;
        let url = if named.namespace() == SYSTEM_NAMESPACE {
            SYSTEM_MODEL_URL.to_string()
        } else {
            self.model_by_name(named.namespace())?.url().to_string()
        };
        Ok(QName::new(url, named.name()))
    }

    /// ELM type specifier describing `data_type`
    pub fn data_type_to_type_specifier(&self, data_type: &DataType) -> Result<TypeSpecifier> {
        Ok(match data_type {
            DataType::Any | DataType::Named(_) => TypeSpecifier::Named(NamedTypeSpecifier {
                name: self.data_type_to_qname(data_type)?,
            }),
            DataType::List(element) => TypeSpecifier::List(ListTypeSpecifier {
                element_type: Box::new(self.data_type_to_type_specifier(element)?),
            }),
            DataType::Interval(point) => TypeSpecifier::Interval(IntervalTypeSpecifier {
                point_type: Box::new(self.data_type_to_type_specifier(point)?),
            }),
            DataType::Tuple(tuple) => TypeSpecifier::Tuple(TupleTypeSpecifier {
                element: tuple
                    .elements()
                    .iter()
                    .map(|element| {
                        Ok(TupleElementDefinition {
                            name: element.name.clone(),
                            element_type: Box::new(
                                self.data_type_to_type_specifier(&element.element_type)?,
                            ),
                        })
                    })
                    .collect::<Result<_>>()?,
            }),
            DataType::Choice(choice) => TypeSpecifier::Choice(ChoiceTypeSpecifier {
                choice: choice
                    .types()
                    .iter()
                    .map(|t| self.data_type_to_type_specifier(t))
                    .collect::<Result<_>>()?,
            }),
        })
    }

    // === Conversion Kinds ===

    fn apply_cast(&mut self, expression: ExprId, conversion: &Conversion) -> Result<ExprId> {
        let from = conversion.from_type();
        let to = conversion.to_type();
        if from.is_super_type_of(to) || from.is_compatible_with(to) {
            return self.cast(expression, to);
        }
        if let Some(nested) = conversion.nested() {
            let intermediate = nested.from_type();
            if from.is_super_type_of(intermediate) || from.is_compatible_with(intermediate) {
                let narrowed = self.cast(expression, intermediate)?;
                return self.convert_expression(narrowed, nested);
            }
        }
        self.cast(expression, to)
    }

    fn cast(&mut self, expression: ExprId, to: &DataType) -> Result<ExprId> {
        let as_type = match to {
            DataType::Named(_) => Some(self.data_type_to_qname(to)?),
            _ => None,
        };
        let as_type_specifier = Some(self.data_type_to_type_specifier(to)?);
        Ok(self.alloc_typed(
            ExprKind::As {
                operand: expression,
                as_type,
                as_type_specifier,
                strict: false,
            },
            to.clone(),
        ))
    }

    /// `X` converted element-wise: `(expression) X return convert(X)`
    fn convert_list_elements(
        &mut self,
        expression: ExprId,
        to_type: &DataType,
        element: &Conversion,
    ) -> Result<ExprId> {
        let alias = self.alloc_typed(
            ExprKind::AliasRef {
                name: ELEMENT_ALIAS.to_string(),
            },
            element.from_type().clone(),
        );
        let converted = self.convert_expression(alias, element)?;
        let query = Query {
            sources: vec![AliasedQuerySource {
                alias: ELEMENT_ALIAS.to_string(),
                expression,
            }],
            lets: Vec::new(),
            where_clause: None,
            return_clause: Some(ReturnClause {
                expression: converted,
                distinct: false,
            }),
        };
        Ok(self.alloc_typed(ExprKind::Query(Box::new(query)), to_type.clone()))
    }

    /// Interval rebuilt from its converted bounds
    fn convert_interval(
        &mut self,
        expression: ExprId,
        to_type: &DataType,
        point: &Conversion,
    ) -> Result<ExprId> {
        let point_type = point.from_type().clone();
        let boolean = SystemType::Boolean.data_type();

        let low = self.bound_property(expression, "low", point_type.clone());
        let low = self.convert_expression(low, point)?;
        let high = self.bound_property(expression, "high", point_type);
        let high = self.convert_expression(high, point)?;
        let low_closed = self.bound_property(expression, "lowClosed", boolean.clone());
        let high_closed = self.bound_property(expression, "highClosed", boolean);

        Ok(self.alloc_typed(
            ExprKind::Interval(IntervalSelector {
                low: Some(low),
                high: Some(high),
                low_closed: true,
                high_closed: true,
                low_closed_expression: Some(low_closed),
                high_closed_expression: Some(high_closed),
            }),
            to_type.clone(),
        ))
    }

    fn bound_property(&mut self, source: ExprId, path: &str, result_type: DataType) -> ExprId {
        self.alloc_typed(
            ExprKind::Property {
                source: Some(source),
                path: path.to_string(),
                scope: None,
            },
            result_type,
        )
    }

    /// Built-in conversion to a System type, or a generic `Convert`
    fn apply_primitive(&mut self, expression: ExprId, to_type: &DataType) -> Result<ExprId> {
        let operator = to_type
            .as_named()
            .filter(|named| named.namespace() == SYSTEM_NAMESPACE)
            .and_then(|named| SystemType::from_name(named.name()))
            .and_then(|system| match system {
                SystemType::Boolean => Some(NativeOperator::ToBoolean),
                SystemType::Integer => Some(NativeOperator::ToInteger),
                SystemType::Long => Some(NativeOperator::ToLong),
                SystemType::Decimal => Some(NativeOperator::ToDecimal),
                SystemType::String => Some(NativeOperator::ToString),
                SystemType::Date => Some(NativeOperator::ToDate),
                SystemType::DateTime => Some(NativeOperator::ToDateTime),
                SystemType::Time => Some(NativeOperator::ToTime),
                SystemType::Quantity => Some(NativeOperator::ToQuantity),
                SystemType::Concept => Some(NativeOperator::ToConcept),
                _ => None,
            });

        if let Some(operator) = operator {
            return Ok(self.alloc_typed(
                ExprKind::Native {
                    operator,
                    operands: smallvec![expression],
                },
                to_type.clone(),
            ));
        }

        let to_type_name = match to_type {
            DataType::Named(_) => Some(self.data_type_to_qname(to_type)?),
            _ => None,
        };
        let to_type_specifier = match to_type_name {
            Some(_) => None,
            None => Some(self.data_type_to_type_specifier(to_type)?),
        };
        Ok(self.alloc_typed(
            ExprKind::Convert {
                operand: expression,
                to_type: to_type_name,
                to_type_specifier,
            },
            to_type.clone(),
        ))
    }
}

fn required_nested(conversion: &Conversion) -> Result<&Conversion> {
    conversion.nested().ok_or_else(|| invalid_conversion(conversion))
}

fn invalid_conversion(conversion: &Conversion) -> CqlError {
    CqlError::system(CQL0400, format!("Invalid conversion {}.", conversion))
}
