//! ELM Serialization
//!
//! JSON output of a finished library for inspection. Expressions are
//! written by walking the arena from each definition.

use crate::expression::{ExprArena, ExprId, ExprKind, NamedRef, OperatorShape};
use crate::model::{ExpressionDef, FunctionDef, Library, ParameterDef, Statement};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;

/// Errors that can occur during serialization
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SerializeError> for octofhir_cql_diagnostics::CqlError {
    fn from(err: SerializeError) -> Self {
        Self::system(octofhir_cql_diagnostics::CQL0401, err.to_string())
    }
}

impl Library {
    /// Serialize to compact JSON wrapped in the `{"library": ...}` envelope
    pub fn to_json(&self) -> Result<String, SerializeError> {
        Ok(serde_json::to_string(&Envelope { library: self })?)
    }

    /// Serialize to pretty-printed JSON wrapped in the `{"library": ...}` envelope
    pub fn to_json_pretty(&self) -> Result<String, SerializeError> {
        Ok(serde_json::to_string_pretty(&Envelope { library: self })?)
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    library: &'a Library,
}

impl Serialize for Library {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let arena = self.arena();
        let mut map = serializer.serialize_map(None)?;
        if let Some(identifier) = &self.identifier {
            map.serialize_entry("identifier", identifier)?;
        }
        map.serialize_entry("schemaIdentifier", &self.schema_identifier)?;
        if let Some(usings) = &self.usings {
            map.serialize_entry("usings", usings)?;
        }
        if let Some(includes) = &self.includes {
            map.serialize_entry("includes", includes)?;
        }
        if let Some(parameters) = &self.parameters {
            let defs: Vec<_> = parameters
                .defs
                .iter()
                .map(|def| ParameterView {
                    def,
                    default: def.default.map(|id| ExprView { arena, id }),
                })
                .collect();
            map.serialize_entry("parameters", &Defs { def: defs })?;
        }
        if let Some(code_systems) = &self.code_systems {
            map.serialize_entry("codeSystems", code_systems)?;
        }
        if let Some(value_sets) = &self.value_sets {
            map.serialize_entry("valueSets", value_sets)?;
        }
        if let Some(codes) = &self.codes {
            map.serialize_entry("codes", codes)?;
        }
        if let Some(concepts) = &self.concepts {
            map.serialize_entry("concepts", concepts)?;
        }
        if let Some(contexts) = &self.contexts {
            map.serialize_entry("contexts", contexts)?;
        }
        if let Some(statements) = &self.statements {
            let defs: Vec<_> = statements
                .defs
                .iter()
                .map(|statement| StatementView { arena, statement })
                .collect();
            map.serialize_entry("statements", &Defs { def: defs })?;
        }
        if !self.annotation.is_empty() {
            map.serialize_entry("annotation", &self.annotation)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct Defs<T> {
    def: Vec<T>,
}

#[derive(Serialize)]
struct ParameterView<'a> {
    #[serde(flatten)]
    def: &'a ParameterDef,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<ExprView<'a>>,
}

struct StatementView<'a> {
    arena: &'a ExprArena,
    statement: &'a Statement,
}

impl Serialize for StatementView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct ExpressionView<'a> {
            #[serde(flatten)]
            def: &'a ExpressionDef,
            #[serde(skip_serializing_if = "Option::is_none")]
            expression: Option<ExprView<'a>>,
        }

        #[derive(Serialize)]
        #[serde(tag = "type", rename = "FunctionDef")]
        struct FunctionView<'a> {
            #[serde(flatten)]
            def: &'a FunctionDef,
            #[serde(skip_serializing_if = "Option::is_none")]
            expression: Option<ExprView<'a>>,
        }

        let arena = self.arena;
        match self.statement {
            Statement::Expression(def) => ExpressionView {
                def,
                expression: def.expression.map(|id| ExprView { arena, id }),
            }
            .serialize(serializer),
            Statement::Function(def) => FunctionView {
                def,
                expression: def.expression.map(|id| ExprView { arena, id }),
            }
            .serialize(serializer),
        }
    }
}

/// Serializable view of one arena node and its subtree
#[derive(Clone, Copy)]
pub struct ExprView<'a> {
    pub arena: &'a ExprArena,
    pub id: ExprId,
}

impl<'a> ExprView<'a> {
    fn child(&self, id: ExprId) -> ExprView<'a> {
        ExprView { arena: self.arena, id }
    }

    fn children(&self, ids: &[ExprId]) -> Vec<ExprView<'a>> {
        ids.iter().map(|id| self.child(*id)).collect()
    }
}

fn serialize_ref<M: SerializeMap>(map: &mut M, reference: &NamedRef) -> Result<(), M::Error> {
    if let Some(library_name) = &reference.library_name {
        map.serialize_entry("libraryName", library_name)?;
    }
    map.serialize_entry("name", &reference.name)
}

struct TupleElementView<'a> {
    name: &'a str,
    value: ExprView<'a>,
}

impl Serialize for TupleElementView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("name", self.name)?;
        map.serialize_entry("value", &self.value)?;
        map.end()
    }
}

impl Serialize for ExprView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = &self.arena[self.id];
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", node.kind.type_name())?;
        if let Some(locator) = &node.locator {
            map.serialize_entry("locator", &locator.to_string())?;
        }

        match &node.kind {
            ExprKind::Null => {}
            ExprKind::Literal { value_type, value } => {
                map.serialize_entry("valueType", value_type)?;
                map.serialize_entry("value", value)?;
            }
            ExprKind::Quantity { value, unit } => {
                map.serialize_entry("value", value)?;
                map.serialize_entry("unit", unit)?;
            }
            ExprKind::ExpressionRef(reference)
            | ExprKind::ParameterRef(reference)
            | ExprKind::ValueSetRef(reference)
            | ExprKind::CodeSystemRef(reference)
            | ExprKind::CodeRef(reference)
            | ExprKind::ConceptRef(reference)
            | ExprKind::IdentifierRef(reference) => serialize_ref(&mut map, reference)?,
            ExprKind::FunctionRef { target, operands } => {
                serialize_ref(&mut map, target)?;
                map.serialize_entry("operand", &self.children(operands))?;
            }
            ExprKind::OperandRef { name }
            | ExprKind::AliasRef { name }
            | ExprKind::QueryLetRef { name } => {
                map.serialize_entry("name", name)?;
            }
            ExprKind::LibraryRef { library_name } => {
                map.serialize_entry("libraryName", library_name)?;
            }
            ExprKind::Property { source, path, scope } => {
                if let Some(source) = source {
                    map.serialize_entry("source", &self.child(*source))?;
                }
                map.serialize_entry("path", path)?;
                if let Some(scope) = scope {
                    map.serialize_entry("scope", scope)?;
                }
            }
            ExprKind::Native { operator, operands } => match operator.shape() {
                OperatorShape::Unary => {
                    if let Some(operand) = operands.first() {
                        map.serialize_entry("operand", &self.child(*operand))?;
                    }
                }
                OperatorShape::Aggregate => {
                    if let Some(source) = operands.first() {
                        map.serialize_entry("source", &self.child(*source))?;
                    }
                }
                OperatorShape::Binary | OperatorShape::Nary => {
                    map.serialize_entry("operand", &self.children(operands))?;
                }
            },
            ExprKind::As {
                operand,
                as_type,
                as_type_specifier,
                strict,
            } => {
                map.serialize_entry("operand", &self.child(*operand))?;
                if let Some(as_type) = as_type {
                    map.serialize_entry("asType", as_type)?;
                }
                if let Some(specifier) = as_type_specifier {
                    map.serialize_entry("asTypeSpecifier", specifier)?;
                }
                map.serialize_entry("strict", strict)?;
            }
            ExprKind::Convert {
                operand,
                to_type,
                to_type_specifier,
            } => {
                map.serialize_entry("operand", &self.child(*operand))?;
                if let Some(to_type) = to_type {
                    map.serialize_entry("toType", to_type)?;
                }
                if let Some(specifier) = to_type_specifier {
                    map.serialize_entry("toTypeSpecifier", specifier)?;
                }
            }
            ExprKind::List { elements } => {
                map.serialize_entry("element", &self.children(elements))?;
            }
            ExprKind::Interval(interval) => {
                if let Some(low) = interval.low {
                    map.serialize_entry("low", &self.child(low))?;
                }
                if let Some(high) = interval.high {
                    map.serialize_entry("high", &self.child(high))?;
                }
                match interval.low_closed_expression {
                    Some(expression) => {
                        map.serialize_entry("lowClosedExpression", &self.child(expression))?
                    }
                    None => map.serialize_entry("lowClosed", &interval.low_closed)?,
                }
                match interval.high_closed_expression {
                    Some(expression) => {
                        map.serialize_entry("highClosedExpression", &self.child(expression))?
                    }
                    None => map.serialize_entry("highClosed", &interval.high_closed)?,
                }
            }
            ExprKind::Tuple { elements } => {
                let elements: Vec<_> = elements
                    .iter()
                    .map(|(name, value)| TupleElementView {
                        name,
                        value: self.child(*value),
                    })
                    .collect();
                map.serialize_entry("element", &elements)?;
            }
            ExprKind::Query(query) => {
                map.serialize_entry("source", &SourcesView { view: *self, query })?;
                if !query.lets.is_empty() {
                    let lets: Vec<_> = query
                        .lets
                        .iter()
                        .map(|clause| LetView {
                            identifier: &clause.identifier,
                            expression: self.child(clause.expression),
                        })
                        .collect();
                    map.serialize_entry("let", &lets)?;
                }
                if let Some(where_clause) = query.where_clause {
                    map.serialize_entry("where", &self.child(where_clause))?;
                }
                if let Some(return_clause) = &query.return_clause {
                    map.serialize_entry(
                        "return",
                        &ReturnView {
                            expression: self.child(return_clause.expression),
                            distinct: return_clause.distinct,
                        },
                    )?;
                }
            }
        }
        map.end()
    }
}

struct SourcesView<'a> {
    view: ExprView<'a>,
    query: &'a crate::expression::Query,
}

impl Serialize for SourcesView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Source<'a> {
            alias: &'a str,
            expression: ExprView<'a>,
        }

        let mut seq = serializer.serialize_seq(Some(self.query.sources.len()))?;
        for source in &self.query.sources {
            seq.serialize_element(&Source {
                alias: &source.alias,
                expression: self.view.child(source.expression),
            })?;
        }
        seq.end()
    }
}

#[derive(Serialize)]
struct LetView<'a> {
    identifier: &'a str,
    expression: ExprView<'a>,
}

#[derive(Serialize)]
struct ReturnView<'a> {
    expression: ExprView<'a>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    distinct: bool,
}
