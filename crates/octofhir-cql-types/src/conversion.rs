//! Conversion catalog
//!
//! A `Conversion` is one edge of the conversion graph between two data types.
//! The `ConversionMap` collects the edges exported by models and libraries and
//! derives compound conversions (casts, list and interval mappings, list
//! promotion and demotion) on demand.

use crate::{DataType, Operator, TypeError};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// How a conversion is realized in the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConversionKind {
    /// Type cast; no runtime conversion
    Cast,
    /// `List<A>` to `List<B>` through a per-element conversion
    ListElement,
    /// `List<T>` to `T` through singleton extraction
    ListDemotion,
    /// `T` to `List<T>` by wrapping
    ListPromotion,
    /// `Interval<A>` to `Interval<B>` through a point conversion
    Interval,
    /// Call to a named conversion operator
    Operator,
    /// Canonical built-in coercion node
    Primitive,
}

impl ConversionKind {
    /// Preference of this kind; lower is better
    pub const fn base_cost(&self) -> u32 {
        match self {
            Self::Cast => 3,
            Self::Operator | Self::Primitive => 4,
            Self::ListElement | Self::Interval => 5,
            Self::ListDemotion => 7,
            Self::ListPromotion => 9,
        }
    }
}

/// One conversion edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    from_type: DataType,
    to_type: DataType,
    kind: ConversionKind,
    implicit: bool,
    nested: Option<Box<Conversion>>,
    operator: Option<Operator>,
}

impl Conversion {
    fn new(kind: ConversionKind, from_type: DataType, to_type: DataType) -> Self {
        Self {
            from_type,
            to_type,
            kind,
            implicit: true,
            nested: None,
            operator: None,
        }
    }

    fn with_nested(mut self, nested: Option<Conversion>) -> Self {
        self.nested = nested.map(Box::new);
        self
    }

    /// Cast between related types
    pub fn cast(from_type: DataType, to_type: DataType) -> Self {
        Self::new(ConversionKind::Cast, from_type, to_type)
    }

    /// Cast to the source type of `nested`, then apply `nested`
    pub fn cast_then(from_type: DataType, to_type: DataType, nested: Conversion) -> Self {
        Self::cast(from_type, to_type).with_nested(Some(nested))
    }

    /// Conversion realized by calling `operator`; the operator must be unary
    pub fn operator(operator: Operator, implicit: bool) -> Self {
        let from_type = operator
            .signature()
            .operand_types()
            .first()
            .cloned()
            .unwrap_or(DataType::Any);
        let to_type = operator.result_type().clone();
        let mut conversion = Self::new(ConversionKind::Operator, from_type, to_type);
        conversion.implicit = implicit;
        conversion.operator = Some(operator);
        conversion
    }

    /// Conversion realized by a canonical coercion node
    pub fn primitive(from_type: DataType, to_type: DataType, implicit: bool) -> Self {
        let mut conversion = Self::new(ConversionKind::Primitive, from_type, to_type);
        conversion.implicit = implicit;
        conversion
    }

    /// Per-element list conversion
    pub fn list_element(from_type: DataType, to_type: DataType, element: Conversion) -> Self {
        Self::new(ConversionKind::ListElement, from_type, to_type).with_nested(Some(element))
    }

    /// Singleton extraction, optionally followed by `nested`
    pub fn list_demotion(
        from_type: DataType,
        to_type: DataType,
        nested: Option<Conversion>,
    ) -> Self {
        Self::new(ConversionKind::ListDemotion, from_type, to_type).with_nested(nested)
    }

    /// Wrapping in a list, after applying `nested` if present
    pub fn list_promotion(
        from_type: DataType,
        to_type: DataType,
        nested: Option<Conversion>,
    ) -> Self {
        Self::new(ConversionKind::ListPromotion, from_type, to_type).with_nested(nested)
    }

    /// Point-wise interval conversion
    pub fn interval(from_type: DataType, to_type: DataType, point: Conversion) -> Self {
        Self::new(ConversionKind::Interval, from_type, to_type).with_nested(Some(point))
    }

    pub fn from_type(&self) -> &DataType {
        &self.from_type
    }

    pub fn to_type(&self) -> &DataType {
        &self.to_type
    }

    pub fn kind(&self) -> ConversionKind {
        self.kind
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn is_cast(&self) -> bool {
        self.kind == ConversionKind::Cast
    }

    /// Conversion applied before or inside this one
    pub fn nested(&self) -> Option<&Conversion> {
        self.nested.as_deref()
    }

    /// Backing operator of an operator conversion
    pub fn operator_ref(&self) -> Option<&Operator> {
        self.operator.as_ref()
    }

    /// Total cost including nested conversions
    pub fn cost(&self) -> u32 {
        self.kind.base_cost() + self.nested().map(Conversion::cost).unwrap_or(0)
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} -> {}", self.kind, self.from_type, self.to_type)
    }
}

/// Catalog of conversions keyed by source type
#[derive(Debug, Clone)]
pub struct ConversionMap {
    by_from: IndexMap<DataType, Vec<Conversion>>,
    list_promotion: bool,
    list_demotion: bool,
}

impl Default for ConversionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionMap {
    /// Create an empty map with list promotion and demotion enabled
    pub fn new() -> Self {
        Self {
            by_from: IndexMap::new(),
            list_promotion: true,
            list_demotion: true,
        }
    }

    /// Enable or disable `T -> List<T>` conversions
    pub fn set_list_promotion(&mut self, enabled: bool) {
        self.list_promotion = enabled;
    }

    /// Enable or disable `List<T> -> T` conversions
    pub fn set_list_demotion(&mut self, enabled: bool) {
        self.list_demotion = enabled;
    }

    /// Register a conversion; an identical edge is only kept once
    pub fn add(&mut self, conversion: Conversion) {
        let entries = self.by_from.entry(conversion.from_type.clone()).or_default();
        if !entries.contains(&conversion) {
            entries.push(conversion);
        }
    }

    /// Register several conversions
    pub fn add_all<'a>(&mut self, conversions: impl IntoIterator<Item = &'a Conversion>) {
        for conversion in conversions {
            self.add(conversion.clone());
        }
    }

    /// Declared conversions out of `from`
    pub fn conversions_from(&self, from: &DataType) -> &[Conversion] {
        self.by_from.get(from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of declared conversions
    pub fn len(&self) -> usize {
        self.by_from.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the best conversion from `from` to `to`
    ///
    /// Identical types need no conversion and yield `None`. With `implicit` set,
    /// explicit-only declared conversions are ignored.
    pub fn find_conversion(
        &self,
        from: &DataType,
        to: &DataType,
        implicit: bool,
    ) -> Result<Option<Conversion>, TypeError> {
        if from == to {
            return Ok(None);
        }

        // Downcast: the value may already be of the requested type
        if from.is_super_type_of(to) {
            return Ok(Some(Conversion::cast(from.clone(), to.clone())));
        }

        if let Some(conversion) = self.find_declared_conversion(from, to, implicit)? {
            return Ok(Some(conversion));
        }

        if let DataType::Choice(choice) = from {
            for alternative in choice.types() {
                if to.is_super_type_of(alternative) {
                    return Ok(Some(Conversion::cast(from.clone(), to.clone())));
                }
                if let Some(nested) = self.find_conversion(alternative, to, implicit)? {
                    return Ok(Some(Conversion::cast_then(from.clone(), to.clone(), nested)));
                }
            }
        }

        if let DataType::Choice(choice) = to {
            if choice.types().iter().any(|t| t.is_super_type_of(from)) {
                return Ok(Some(Conversion::cast(from.clone(), to.clone())));
            }
        }

        match (from, to) {
            (DataType::List(from_element), DataType::List(to_element)) => {
                return Ok(self
                    .find_conversion(from_element, to_element, implicit)?
                    .map(|element| Conversion::list_element(from.clone(), to.clone(), element)));
            }
            (DataType::Interval(from_point), DataType::Interval(to_point)) => {
                return Ok(self
                    .find_conversion(from_point, to_point, implicit)?
                    .map(|point| Conversion::interval(from.clone(), to.clone(), point)));
            }
            (DataType::List(from_element), _) if self.list_demotion => {
                if from_element.is_sub_type_of(to) {
                    return Ok(Some(Conversion::list_demotion(from.clone(), to.clone(), None)));
                }
                if let Some(nested) = self.find_conversion(from_element, to, implicit)? {
                    let demotion =
                        Conversion::list_demotion(from.clone(), to.clone(), Some(nested));
                    return Ok(Some(demotion));
                }
            }
            (_, DataType::List(to_element)) if self.list_promotion => {
                if from.is_sub_type_of(to_element) {
                    return Ok(Some(Conversion::list_promotion(from.clone(), to.clone(), None)));
                }
                if let Some(nested) = self.find_conversion(from, to_element, implicit)? {
                    let promotion =
                        Conversion::list_promotion(from.clone(), to.clone(), Some(nested));
                    return Ok(Some(promotion));
                }
            }
            _ => {}
        }

        Ok(None)
    }

    fn find_declared_conversion(
        &self,
        from: &DataType,
        to: &DataType,
        implicit: bool,
    ) -> Result<Option<Conversion>, TypeError> {
        let mut best: Option<&Conversion> = None;
        let mut best_score = u32::MAX;
        for conversion in self.conversions_from(from) {
            if implicit && !conversion.implicit {
                continue;
            }
            if !to.is_super_type_of(&conversion.to_type)
                && !conversion.to_type.is_compatible_with(to)
            {
                continue;
            }
            let score = if conversion.to_type == *to { 0 } else { 2 };
            if score < best_score {
                best = Some(conversion);
                best_score = score;
            } else if score == best_score {
                return Err(TypeError::AmbiguousConversion {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        Ok(best.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Signature, SystemType};

    fn integer() -> DataType {
        SystemType::Integer.data_type()
    }

    fn decimal() -> DataType {
        SystemType::Decimal.data_type()
    }

    fn to_decimal() -> Conversion {
        Conversion::operator(
            Operator::new("ToDecimal", Signature::new(vec![integer()]), decimal()),
            true,
        )
    }

    fn catalog() -> ConversionMap {
        let mut map = ConversionMap::new();
        map.add(to_decimal());
        map.add(Conversion::primitive(decimal(), SystemType::String.data_type(), false));
        map
    }

    #[test]
    fn test_identity_needs_no_conversion() {
        assert_eq!(catalog().find_conversion(&integer(), &integer(), true).unwrap(), None);
    }

    #[test]
    fn test_declared_conversion() {
        let found = catalog().find_conversion(&integer(), &decimal(), true).unwrap().unwrap();
        assert_eq!(found.kind(), ConversionKind::Operator);
        assert_eq!(found.operator_ref().map(Operator::name), Some("ToDecimal"));
    }

    #[test]
    fn test_explicit_conversion_hidden_from_implicit_search() {
        let map = catalog();
        let string = SystemType::String.data_type();
        assert!(map.find_conversion(&decimal(), &string, true).unwrap().is_none());
        assert!(map.find_conversion(&decimal(), &string, false).unwrap().is_some());
    }

    #[test]
    fn test_downcast_from_any() {
        let found = catalog().find_conversion(&DataType::Any, &integer(), true).unwrap().unwrap();
        assert!(found.is_cast());
    }

    #[test]
    fn test_list_element_conversion() {
        let found = catalog()
            .find_conversion(&DataType::list(integer()), &DataType::list(decimal()), true)
            .unwrap()
            .unwrap();
        assert_eq!(found.kind(), ConversionKind::ListElement);
        assert_eq!(found.nested(), Some(&to_decimal()));
    }

    #[test]
    fn test_promotion_and_demotion() {
        let map = catalog();
        let promote = map
            .find_conversion(&integer(), &DataType::list(integer()), true)
            .unwrap()
            .unwrap();
        assert_eq!(promote.kind(), ConversionKind::ListPromotion);

        let demote = map
            .find_conversion(&DataType::list(integer()), &decimal(), true)
            .unwrap()
            .unwrap();
        assert_eq!(demote.kind(), ConversionKind::ListDemotion);
        assert_eq!(demote.cost(), 7 + 4);
    }

    #[test]
    fn test_promotion_can_be_disabled() {
        let mut map = catalog();
        map.set_list_promotion(false);
        assert!(map
            .find_conversion(&integer(), &DataType::list(integer()), true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ambiguous_declared_conversion() {
        let mut map = ConversionMap::new();
        let long = SystemType::Long.data_type();
        let choice = DataType::choice([decimal(), long.clone()]);
        map.add(to_decimal());
        map.add(Conversion::operator(
            Operator::new("ToLong", Signature::new(vec![integer()]), long),
            true,
        ));
        let err = map.find_conversion(&integer(), &choice, true);
        assert!(matches!(err, Err(TypeError::AmbiguousConversion { .. })));
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut map = catalog();
        map.add(to_decimal());
        assert_eq!(map.len(), 2);
    }
}
