//! Type relation tests for the CQL type system
//!
//! Tests:
//! - Supertype and compatibility laws over generated types
//! - Member resolution on interval, tuple and choice types
//! - Conversion search across list, interval and choice shapes
//! - Rendering of type names and errors

use octofhir_cql_types::{
    ClassTypeElement, Conversion, ConversionKind, ConversionMap, DataType, NamedType, Operator,
    Signature, SystemType, TypeError,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

fn system(t: SystemType) -> DataType {
    t.data_type()
}

fn human_name() -> DataType {
    DataType::named(NamedType::new("Test", "HumanName", None).with_elements(vec![
        ClassTypeElement::new("family", system(SystemType::String)),
    ]))
}

fn address() -> DataType {
    DataType::named(NamedType::new("Test", "Address", None).with_elements(vec![
        ClassTypeElement::new("city", system(SystemType::String)),
        ClassTypeElement::new("family", system(SystemType::Integer)),
    ]))
}

// === Generated Types ===

fn leaf() -> impl Strategy<Value = DataType> {
    prop::sample::select(vec![
        SystemType::Any,
        SystemType::Boolean,
        SystemType::Integer,
        SystemType::Decimal,
        SystemType::String,
        SystemType::Date,
        SystemType::Code,
    ])
    .prop_map(|t| t.data_type())
}

fn data_type() -> impl Strategy<Value = DataType> {
    leaf().prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(DataType::list),
            inner.clone().prop_map(DataType::interval),
            (inner.clone(), inner).prop_map(|(a, b)| DataType::tuple([("a", a), ("b", b)])),
        ]
    })
}

proptest! {
    #[test]
    fn supertype_is_reflexive(t in data_type()) {
        prop_assert!(t.is_super_type_of(&t));
        prop_assert!(t.is_compatible_with(&t));
    }

    #[test]
    fn any_is_top(t in data_type()) {
        prop_assert!(DataType::Any.is_super_type_of(&t));
    }

    #[test]
    fn list_wrapping_preserves_subtyping(a in data_type(), b in data_type()) {
        prop_assert_eq!(
            a.is_super_type_of(&b),
            DataType::list(a.clone()).is_super_type_of(&DataType::list(b.clone()))
        );
    }
}

// === Member Resolution ===

#[rstest]
#[case("low", Some(SystemType::DateTime))]
#[case("high", Some(SystemType::DateTime))]
#[case("lowClosed", Some(SystemType::Boolean))]
#[case("highClosed", Some(SystemType::Boolean))]
fn test_interval_members(#[case] member: &str, #[case] expected: Option<SystemType>) {
    let interval = DataType::interval(system(SystemType::DateTime));
    assert_eq!(
        interval.resolve_property(member).unwrap(),
        expected.map(|t| t.data_type())
    );
}

#[test]
fn test_interval_unknown_member() {
    let interval = DataType::interval(system(SystemType::Integer));
    assert_eq!(
        interval.resolve_property("width").unwrap_err(),
        TypeError::InvalidIntervalProperty("width".into())
    );
}

#[test]
fn test_tuple_member() {
    let tuple = DataType::tuple([("name", human_name()), ("age", system(SystemType::Integer))]);
    assert_eq!(tuple.resolve_property("name").unwrap(), Some(human_name()));
    assert_eq!(tuple.resolve_property("other").unwrap(), None);
}

#[test]
fn test_choice_member_same_type() {
    let choice = DataType::choice([human_name(), address()]);
    assert_eq!(choice.resolve_property("city").unwrap(), Some(system(SystemType::String)));
}

#[test]
fn test_choice_member_different_types() {
    let choice = DataType::choice([human_name(), address()]);
    assert_eq!(
        choice.resolve_property("family").unwrap(),
        Some(DataType::choice([
            system(SystemType::String),
            system(SystemType::Integer)
        ]))
    );
    assert_eq!(choice.resolve_property("given").unwrap(), None);
}

// === Conversions ===

fn catalog() -> ConversionMap {
    let mut map = ConversionMap::new();
    map.add(Conversion::operator(
        Operator::new(
            "ToDecimal",
            Signature::new(vec![system(SystemType::Integer)]),
            system(SystemType::Decimal),
        ),
        true,
    ));
    map
}

#[rstest]
#[case(
    DataType::interval(system(SystemType::Integer)),
    DataType::interval(system(SystemType::Decimal)),
    ConversionKind::Interval
)]
#[case(
    DataType::choice([system(SystemType::Integer), system(SystemType::String)]),
    system(SystemType::Integer),
    ConversionKind::Cast
)]
#[case(
    DataType::choice([system(SystemType::Integer), system(SystemType::String)]),
    system(SystemType::Decimal),
    ConversionKind::Cast
)]
#[case(
    system(SystemType::Integer),
    DataType::list(system(SystemType::Decimal)),
    ConversionKind::ListPromotion
)]
fn test_conversion_kinds(
    #[case] from: DataType,
    #[case] to: DataType,
    #[case] kind: ConversionKind,
) {
    let conversion = catalog().find_conversion(&from, &to, true).unwrap().unwrap();
    assert_eq!(conversion.kind(), kind);
    assert_eq!(conversion.from_type(), &from);
    assert_eq!(conversion.to_type(), &to);
}

#[test]
fn test_choice_conversion_casts_then_converts() {
    let from = DataType::choice([system(SystemType::Integer), system(SystemType::String)]);
    let conversion = catalog()
        .find_conversion(&from, &system(SystemType::Decimal), true)
        .unwrap()
        .unwrap();
    let nested = conversion.nested().unwrap();
    assert_eq!(nested.from_type(), &system(SystemType::Integer));
    assert_eq!(nested.kind(), ConversionKind::Operator);
}

#[test]
fn test_unrelated_types_have_no_conversion() {
    assert!(catalog()
        .find_conversion(&system(SystemType::String), &system(SystemType::Date), true)
        .unwrap()
        .is_none());
}

// === Rendering ===

#[test]
fn test_type_names_render() {
    let nested = DataType::list(DataType::interval(system(SystemType::Date)));
    insta::assert_snapshot!(nested.to_string(), @"List<Interval<System.Date>>");
}

#[test]
fn test_prohibited_error_renders() {
    let guarded = DataType::named(NamedType::new("Test", "Guarded", None).with_elements(vec![
        ClassTypeElement::prohibited("hidden", system(SystemType::String)),
    ]));
    let err = guarded.resolve_property("hidden").unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"Element hidden cannot be referenced because it is marked prohibited in type Test.Guarded."
    );
}
