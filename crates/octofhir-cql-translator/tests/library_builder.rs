//! Library builder tests
//!
//! Tests:
//! - Implicit conversions spliced into resolved calls
//! - Cross-context expression references
//! - Member access over lists
//! - Circular definitions and per-definition error capture
//! - Ambiguous type names across models
//! - Access control and includes
//! - Diagnostics mirrored onto the ELM library

use insta::assert_snapshot;
use octofhir_cql_diagnostics::ErrorKind;
use octofhir_cql_elm::{
    Annotation, ErrorType, ExprKind, ExpressionDef, FunctionDef, IncludeDef, NativeOperator,
    OperandDef, VersionedIdentifier,
};
use octofhir_cql_model::{ElementInfo, InMemoryModelProvider, ModelCache, ModelInfo, TypeInfo};
use octofhir_cql_translator::{
    InMemoryLibraryProvider, LibraryBuilder, QueryContext, QuerySource, TranslatedLibrary,
    TranslatorOptions,
};
use octofhir_cql_types::{AccessLevel, CallContext, DataType, Signature, SystemType};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

const CLINICAL_MODEL: &str = r#"{
    "name": "Clinical",
    "version": "1.0",
    "url": "http://example.org/clinical",
    "patientClassName": "Clinical.Patient",
    "typeInfo": [
        {"name": "Patient", "element": [
            {"name": "name", "elementType": "Clinical.HumanName"},
            {"name": "birthDate", "elementType": "System.Date"}
        ]},
        {"name": "HumanName", "element": [
            {"name": "family", "elementType": "System.String"},
            {"name": "given", "elementType": "List<System.String>"}
        ]},
        {"name": "Foo", "element": []}
    ]
}"#;

fn models() -> InMemoryModelProvider {
    InMemoryModelProvider::new()
        .with_json(CLINICAL_MODEL)
        .unwrap()
        .with_model_info(
            ModelInfo::new("Left", None, "http://example.org/left")
                .with_type(TypeInfo::new("Bar"))
                .with_type(TypeInfo::new("Foo")),
        )
        .with_model_info(
            ModelInfo::new("Right", None, "http://example.org/right")
                .with_type(
                    TypeInfo::new("Bar").with_element(ElementInfo::new("value", "System.Integer")),
                ),
        )
}

fn builder_with(
    provider: InMemoryLibraryProvider,
    identifier: Option<VersionedIdentifier>,
) -> LibraryBuilder {
    let mut builder = LibraryBuilder::builder()
        .model_cache(Arc::new(ModelCache::new(Arc::new(models()))))
        .library_provider(Arc::new(provider))
        .options(TranslatorOptions::default())
        .build()
        .unwrap();
    if let Some(identifier) = identifier {
        builder.set_library_identifier(identifier);
    }
    builder.begin_translation().unwrap();
    builder.get_model("Clinical", Some("1.0")).unwrap();
    builder
}

fn builder() -> LibraryBuilder {
    builder_with(
        InMemoryLibraryProvider::new(),
        Some(VersionedIdentifier::new("Main", Some("1.0"))),
    )
}

fn integer() -> DataType {
    SystemType::Integer.data_type()
}

fn decimal() -> DataType {
    SystemType::Decimal.data_type()
}

// === Call Resolution ===

#[test]
fn test_add_integer_and_decimal() {
    let mut builder = builder();
    let one = builder.create_literal("1", "Integer").unwrap();
    let two = builder.create_literal("2.0", "Decimal").unwrap();
    let add = builder.resolve_function(None, "Add", vec![one, two]).unwrap();

    assert_eq!(builder.arena().kind(add).type_name(), "Add");
    assert_eq!(builder.arena().result_type(add), Some(&decimal()));
    let operands = builder.arena().kind(add).operands().to_vec();
    let converted = operands[0];
    assert_eq!(builder.arena().kind(converted).type_name(), "ToDecimal");
    assert_eq!(builder.arena().kind(converted).operands(), &[one]);
    assert_eq!(builder.arena().result_type(converted), Some(&decimal()));
    assert_eq!(operands[1], two);
}

#[test]
fn test_call_resolution_is_deterministic() {
    let builder = builder();
    let system = octofhir_cql_translator::system_library().unwrap();
    let call = CallContext::new(None, "Add", Signature::new(vec![integer(), decimal()]));
    let first = system.resolve_call(&call, builder.conversions()).unwrap();
    let second = system.resolve_call(&call, builder.conversions()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.unwrap().operator().result_type(), &decimal());
}

#[rstest]
#[case("Less", vec!["1", "2.0"], vec!["Integer", "Decimal"], "Boolean")]
#[case("Multiply", vec!["2", "3"], vec!["Integer", "Long"], "Long")]
#[case("Concatenate", vec!["a", "b"], vec!["String", "String"], "String")]
fn test_system_calls(
    #[case] operator: &str,
    #[case] values: Vec<&str>,
    #[case] types: Vec<&str>,
    #[case] result: &str,
) {
    let mut builder = builder();
    let operands = values
        .iter()
        .zip(&types)
        .map(|(value, type_name)| builder.create_literal(*value, type_name).unwrap())
        .collect();
    let call = builder.resolve_function(None, operator, operands).unwrap();
    assert_eq!(
        builder.arena().result_type(call),
        Some(&SystemType::from_name(result).unwrap().data_type())
    );
}

// === Evaluation Context ===

#[test]
fn test_population_reference_to_record_expression() {
    let mut builder = builder();
    let mut age = ExpressionDef::new("Age", Some("Patient"));
    age.result_type = Some(integer());
    builder.add_expression(age).unwrap();

    builder.push_expression_context("Population");
    let mut query = QueryContext::new();
    query.set_in_source_clause(true);

    let (reference, query) = builder
        .with_query_context(query, |b| b.resolve_identifier("Age", true))
        .unwrap();
    let reference = reference.unwrap();

    assert!(matches!(builder.arena().kind(reference), ExprKind::ExpressionRef(_)));
    assert_eq!(builder.arena().result_type(reference), Some(&DataType::list(integer())));
    assert!(query.references_record_context());
    assert!(!builder.in_query_context());
}

#[test]
fn test_invalid_context_reference() {
    let mut builder = builder();
    let mut def = ExpressionDef::new("Visits", Some("Encounter"));
    def.result_type = Some(integer());
    builder.add_expression(def).unwrap();

    builder.push_expression_context("Patient");
    let err = builder.resolve_identifier("Visits", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidContext);
    assert_eq!(
        err.message(),
        "Invalid context reference from Patient context to Encounter context."
    );
}

// === Member Access ===

#[test]
fn test_member_of_list_is_query() {
    let mut builder = builder();
    let patient = builder.require_type_name(None, "Patient").unwrap();
    let human_name = builder.require_type_name(Some("Clinical"), "HumanName").unwrap();
    let patients = builder.alloc_typed(ExprKind::Null, DataType::list(patient));

    let names = builder.resolve_accessor(patients, "name").unwrap();
    assert_eq!(builder.arena().result_type(names), Some(&DataType::list(human_name)));
    let ExprKind::Query(query) = builder.arena().kind(names) else {
        panic!("expected a query over the list");
    };
    assert_eq!(query.sources[0].alias, "$this");
    assert_eq!(query.sources[0].expression, patients);
    let filter = query.where_clause.unwrap();
    assert_eq!(builder.arena().kind(filter).type_name(), "Not");
    assert!(query.return_clause.as_ref().unwrap().distinct);
}

#[test]
fn test_list_valued_member_is_flattened() {
    let mut builder = builder();
    let human_name = builder.require_type_name(None, "HumanName").unwrap();
    let names = builder.alloc_typed(ExprKind::Null, DataType::list(human_name));

    let given = builder.resolve_accessor(names, "given").unwrap();
    let ExprKind::Native { operator, operands } = builder.arena().kind(given).clone() else {
        panic!("expected Flatten");
    };
    assert_eq!(operator, NativeOperator::Flatten);
    assert_eq!(
        builder.arena().result_type(given),
        Some(&DataType::list(SystemType::String.data_type()))
    );
    assert_eq!(
        builder.arena().result_type(operands[0]),
        Some(&DataType::list(DataType::list(SystemType::String.data_type())))
    );
}

#[test]
fn test_implicit_this_frame() {
    let mut builder = builder();
    let patient = builder.require_type_name(None, "Patient").unwrap();
    let source = builder.alloc_typed(ExprKind::Null, patient.clone());

    let (birth_date, _) = builder
        .with_query_context(QueryContext::implicit(source, patient), |b| {
            b.resolve_identifier("birthDate", true)
        })
        .unwrap();
    let birth_date = birth_date.unwrap();
    assert_eq!(
        builder.arena().result_type(birth_date),
        Some(&SystemType::Date.data_type())
    );
}

#[rstest]
#[case("low", integer())]
#[case("highClosed", SystemType::Boolean.data_type())]
fn test_interval_members(#[case] member: &str, #[case] expected: DataType) {
    let builder = builder();
    assert_eq!(
        builder.resolve_property(&DataType::interval(integer()), member, true).unwrap(),
        Some(expected)
    );
}

#[test]
fn test_unknown_interval_member() {
    let builder = builder();
    let err = builder
        .resolve_property(&DataType::interval(integer()), "width", true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
}

// === Type Names ===

#[test]
fn test_ambiguous_type_name() {
    let mut builder = builder();
    builder.get_model("Left", None).unwrap();
    builder.get_model("Right", None).unwrap();

    let err = builder.resolve_type_name(None, "Bar").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousResolution);
    assert_eq!(err.message(), "Type name Bar is ambiguous between Left.Bar and Right.Bar.");

    let left = builder.require_type_name(Some("Left"), "Bar").unwrap();
    let right = builder.require_type_name(Some("Right"), "Bar").unwrap();
    assert_ne!(left, right);
}

#[test]
fn test_default_model_wins() {
    let mut builder = builder();
    builder.get_model("Left", None).unwrap();
    let foo = builder.require_type_name(None, "Foo").unwrap();
    assert_eq!(foo.qualified_name(), "Clinical.Foo");
}

#[test]
fn test_model_version_conflict() {
    let mut builder = builder();
    let err = builder.get_model("Clinical", Some("2.0")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelVersionConflict);
}

// === Conversions ===

#[test]
fn test_promotion_then_demotion_keeps_type() {
    let mut builder = builder();
    let value = builder.create_literal("1", "Integer").unwrap();
    let promoted = builder.convert_to(value, &DataType::list(integer()), true).unwrap();
    assert_eq!(builder.arena().result_type(promoted), Some(&DataType::list(integer())));
    let demoted = builder.convert_to(promoted, &integer(), true).unwrap();
    assert_eq!(builder.arena().result_type(demoted), builder.arena().result_type(value));
}

#[test]
fn test_promotion_disabled() {
    let options = TranslatorOptions {
        enable_list_promotion: false,
        ..TranslatorOptions::default()
    };
    let mut builder = LibraryBuilder::builder()
        .model_cache(Arc::new(ModelCache::new(Arc::new(models()))))
        .library_provider(Arc::new(InMemoryLibraryProvider::new()))
        .options(options)
        .build()
        .unwrap();
    builder.begin_translation().unwrap();
    let value = builder.create_literal("1", "Integer").unwrap();
    let err = builder.convert_to(value, &DataType::list(integer()), true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

// === Definitions ===

#[test]
fn test_circular_definition() {
    let mut builder = builder();
    builder.push_expression_definition("A").unwrap();
    let err = builder.push_expression_definition("A").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircularReference);
    assert_eq!(
        err.message(),
        "Cannot resolve reference to expression A because it results in a circular reference."
    );

    assert_eq!(builder.pop_expression_definition().unwrap(), "A");
    builder.push_expression_definition("A").unwrap();
}

#[test]
fn test_translate_statement_continues_after_error() {
    let mut builder = builder();
    builder.push_expression_context("Patient");

    let failed = builder
        .translate_statement("Broken", |b| b.resolve_identifier("Missing", true))
        .unwrap();
    assert!(failed.is_none());

    let ok = builder
        .translate_statement("Fine", |b| b.create_literal("1", "Integer"))
        .unwrap();
    assert!(ok.is_some());

    let nested = builder
        .translate_statement("Loop", |b| {
            b.translate_statement("Loop", |b| b.create_literal("1", "Integer"))
        })
        .unwrap();
    assert_eq!(nested, Some(None));

    let messages: Vec<String> = builder.errors().iter().map(|e| e.message()).collect();
    assert_snapshot!(messages.join("\n"), @r"
    Could not resolve identifier Missing in the current library.
    Cannot resolve reference to expression Loop because it results in a circular reference.
    ");
    assert_eq!(builder.library().annotation.len(), 2);
}

#[test]
fn test_duplicate_definition() {
    let mut builder = builder();
    let mut def = ExpressionDef::new("Flag", Some("Patient"));
    def.result_type = Some(SystemType::Boolean.data_type());
    builder.add_expression(def.clone()).unwrap();
    let err = builder.add_expression(def).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateDefinition);
}

// === Includes And Access ===

fn common_library() -> TranslatedLibrary {
    let mut library = TranslatedLibrary::new(Some(VersionedIdentifier::new("Common", Some("1.0"))));
    let mut hidden = ExpressionDef::new("Hidden", Some("Patient"));
    hidden.result_type = Some(integer());
    hidden.access_level = AccessLevel::Private;
    library
        .add(octofhir_cql_translator::Definition::Expression(hidden))
        .unwrap();
    let mut shown = ExpressionDef::new("Shown", Some("Patient"));
    shown.result_type = Some(integer());
    library
        .add(octofhir_cql_translator::Definition::Expression(shown))
        .unwrap();

    let mut widen = FunctionDef::new("Widen", vec![OperandDef::new("x", integer())]);
    widen.result_type = Some(decimal());
    library.add_function(&widen).unwrap();
    library
}

fn include_common(builder: &mut LibraryBuilder) {
    builder
        .add_include(IncludeDef {
            local_identifier: "Common".into(),
            path: "Common".into(),
            version: Some("1.0".into()),
        })
        .unwrap();
}

#[test]
fn test_included_expression_access() {
    let mut builder = builder_with(
        InMemoryLibraryProvider::new().with_library(common_library()),
        Some(VersionedIdentifier::new("Main", Some("1.0"))),
    );
    include_common(&mut builder);
    builder.push_expression_context("Patient");

    let library = builder.resolve_identifier("Common", true).unwrap().unwrap();
    let shown = builder.resolve_accessor(library, "Shown").unwrap();
    assert_eq!(builder.arena().result_type(shown), Some(&integer()));

    let err = builder.resolve_accessor(library, "Hidden").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccessViolation);

    let err = builder.resolve_accessor(library, "Absent").unwrap_err();
    assert_eq!(err.message(), "Could not resolve identifier Absent in library Common.");
}

#[test]
fn test_unnamed_library_cannot_include() {
    let mut builder = builder_with(InMemoryLibraryProvider::new(), None);
    let err = builder
        .add_include(IncludeDef {
            local_identifier: "Common".into(),
            path: "Common".into(),
            version: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
}

#[test]
fn test_missing_include_annotation() {
    let mut builder = builder();
    include_common(&mut builder);

    assert_eq!(builder.errors().len(), 1);
    let Annotation::CqlToElmError(annotation) = &builder.library().annotation[0];
    assert_eq!(annotation.error_type, ErrorType::Include);
    assert_eq!(annotation.library_id.as_deref(), Some("Main"));
    assert_eq!(annotation.target_include_library_id.as_deref(), Some("Common"));
}

#[test]
fn test_configuration_error() {
    let err = LibraryBuilder::builder()
        .model_cache(Arc::new(ModelCache::new(Arc::new(models()))))
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.is_fatal());
}

#[test]
fn test_translation_output() {
    let mut builder = builder();
    let mut def = ExpressionDef::new("One", Some("Patient"));
    let one = builder.create_literal("1", "Integer").unwrap();
    def.expression = Some(one);
    def.result_type = Some(integer());
    builder.add_expression(def).unwrap();
    builder.end_translation();

    let translation = builder.finish();
    assert!(translation.errors.is_empty());
    assert!(translation.translated.resolve("One").is_some());
    let usings: Vec<&str> = translation
        .library
        .using_defs()
        .iter()
        .map(|u| u.local_identifier.as_str())
        .collect();
    assert_eq!(usings, vec!["System", "Clinical"]);
    assert!(translation.library.expression_def("One").is_some());
}

#[test]
fn test_alias_source_binding() {
    let mut builder = builder();
    let patient = builder.require_type_name(None, "Patient").unwrap();
    let patients = builder.alloc_typed(ExprKind::Null, DataType::list(patient.clone()));
    let mut query = QueryContext::new();
    query.add_source(QuerySource::new("P", patients, DataType::list(patient.clone())));
    builder.push_query_context(query);

    let alias = builder.resolve_identifier("P", true).unwrap().unwrap();
    assert_eq!(builder.arena().result_type(alias), Some(&patient));
    builder.pop_query_context().unwrap();
    assert!(builder.pop_query_context().unwrap_err().is_fatal());
}
