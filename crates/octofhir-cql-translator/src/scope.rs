//! Scope management for the library builder
//!
//! The builder tracks several nested lookup contexts while the driver walks
//! the source:
//! - query frames with their aliases and let bindings
//! - the expression context (per-record or per-population evaluation)
//! - the expression definitions currently being translated
//! - expression targets of fluent or qualified invocations
//! - the operands of the function being defined
//!
//! Every stack is pushed and popped in syntactic order. Popping an empty
//! stack is driver misuse and reported as an invalid-state error.

use indexmap::IndexMap;
use octofhir_cql_diagnostics::{CQL0114, CQL0400, CqlError, Result};
use octofhir_cql_elm::{ExprId, OperandDef};
use octofhir_cql_types::DataType;

/// Alias of the implicit query frame used for property paths over lists
pub const THIS_ALIAS: &str = "$this";

/// A query source bound to an alias
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySource {
    pub alias: String,
    pub expression: ExprId,
    /// Type of the source expression
    pub result_type: DataType,
}

impl QuerySource {
    pub fn new(alias: impl Into<String>, expression: ExprId, result_type: DataType) -> Self {
        Self {
            alias: alias.into(),
            expression,
            result_type,
        }
    }

    /// Type an alias reference to this source has
    pub fn element_type(&self) -> &DataType {
        self.result_type.element_type().unwrap_or(&self.result_type)
    }
}

/// A let binding of a query
#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub identifier: String,
    pub expression: ExprId,
    pub result_type: DataType,
}

impl LetBinding {
    pub fn new(identifier: impl Into<String>, expression: ExprId, result_type: DataType) -> Self {
        Self {
            identifier: identifier.into(),
            expression,
            result_type,
        }
    }
}

/// One query frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    sources: IndexMap<String, QuerySource>,
    lets: IndexMap<String, LetBinding>,
    implicit: bool,
    singular: bool,
    in_source_clause: bool,
    in_sort_clause: bool,
    result_element_type: Option<DataType>,
    references_record_context: bool,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame whose single `$this` source makes element members directly visible
    pub fn implicit(expression: ExprId, result_type: DataType) -> Self {
        let mut context = Self {
            implicit: true,
            ..Self::default()
        };
        context.add_source(QuerySource::new(THIS_ALIAS, expression, result_type));
        context
    }

    /// Bind a source; the frame is singular while no source is a list
    pub fn add_source(&mut self, source: QuerySource) {
        self.singular = if self.sources.is_empty() {
            !source.result_type.is_list()
        } else {
            self.singular && !source.result_type.is_list()
        };
        self.sources.insert(source.alias.clone(), source);
    }

    pub fn add_let(&mut self, binding: LetBinding) {
        self.lets.insert(binding.identifier.clone(), binding);
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<&QuerySource> {
        self.sources.get(alias)
    }

    pub fn resolve_let(&self, identifier: &str) -> Option<&LetBinding> {
        self.lets.get(identifier)
    }

    pub fn sources(&self) -> impl Iterator<Item = &QuerySource> {
        self.sources.values()
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn is_singular(&self) -> bool {
        self.singular
    }

    pub fn in_source_clause(&self) -> bool {
        self.in_source_clause
    }

    pub fn set_in_source_clause(&mut self, value: bool) {
        self.in_source_clause = value;
    }

    pub fn in_sort_clause(&self) -> bool {
        self.in_sort_clause
    }

    pub fn set_in_sort_clause(&mut self, value: bool) {
        self.in_sort_clause = value;
    }

    /// Element type of the query result, used by sort clauses
    pub fn result_element_type(&self) -> Option<&DataType> {
        self.result_element_type.as_ref()
    }

    pub fn set_result_element_type(&mut self, result_element_type: DataType) {
        self.result_element_type = Some(result_element_type);
    }

    /// Mark that a source references per-record definitions from population context
    pub fn reference_record_context(&mut self) {
        self.references_record_context = true;
    }

    pub fn references_record_context(&self) -> bool {
        self.references_record_context
    }
}

/// Depth of every stack, taken on entry to a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeDepth {
    queries: usize,
    expression_contexts: usize,
    expression_definitions: usize,
    targets: usize,
    in_function: bool,
}

/// The nested lookup contexts of one builder
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    queries: Vec<QueryContext>,
    expression_contexts: Vec<String>,
    expression_definitions: Vec<String>,
    targets: Vec<ExprId>,
    function_operands: Option<Vec<OperandDef>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    // === Query Frames ===

    pub fn push_query(&mut self, context: QueryContext) {
        self.queries.push(context);
    }

    pub fn pop_query(&mut self) -> Result<QueryContext> {
        self.queries.pop().ok_or_else(|| empty_stack("Query context"))
    }

    /// Innermost query frame
    pub fn peek_query(&self) -> Option<&QueryContext> {
        self.queries.last()
    }

    pub fn peek_query_mut(&mut self) -> Option<&mut QueryContext> {
        self.queries.last_mut()
    }

    pub fn in_query(&self) -> bool {
        !self.queries.is_empty()
    }

    /// Find an alias, innermost frame first
    pub fn resolve_alias(&self, alias: &str) -> Option<&QuerySource> {
        self.queries.iter().rev().find_map(|q| q.resolve_alias(alias))
    }

    /// Find a let binding, innermost frame first
    pub fn resolve_let(&self, identifier: &str) -> Option<&LetBinding> {
        self.queries.iter().rev().find_map(|q| q.resolve_let(identifier))
    }

    // === Expression Context ===

    pub fn push_expression_context(&mut self, context: impl Into<String>) {
        self.expression_contexts.push(context.into());
    }

    pub fn pop_expression_context(&mut self) -> Result<String> {
        self.expression_contexts
            .pop()
            .ok_or_else(|| empty_stack("Expression context"))
    }

    pub fn current_expression_context(&self) -> Result<&str> {
        self.expression_contexts
            .last()
            .map(String::as_str)
            .ok_or_else(|| empty_stack("Expression context"))
    }

    // === Definitions In Progress ===

    /// Enter a definition; entering one that is already in progress is circular
    pub fn push_expression_definition(&mut self, identifier: &str) -> Result<()> {
        if self.expression_definitions.iter().any(|d| d == identifier) {
            return Err(CqlError::semantic(
                CQL0114,
                format!(
                    "Cannot resolve reference to expression {} because it results in a circular reference.",
                    identifier
                ),
            ));
        }
        self.expression_definitions.push(identifier.to_string());
        Ok(())
    }

    pub fn pop_expression_definition(&mut self) -> Result<String> {
        self.expression_definitions
            .pop()
            .ok_or_else(|| empty_stack("Expression definition"))
    }

    // === Expression Targets ===

    pub fn push_target(&mut self, target: ExprId) {
        self.targets.push(target);
    }

    pub fn pop_target(&mut self) -> Result<ExprId> {
        self.targets.pop().ok_or_else(|| empty_stack("Expression target"))
    }

    pub fn has_target(&self) -> bool {
        !self.targets.is_empty()
    }

    // === Function Definitions ===

    pub fn begin_function(&mut self, operands: Vec<OperandDef>) {
        self.function_operands = Some(operands);
    }

    pub fn end_function(&mut self) {
        self.function_operands = None;
    }

    /// Operand of the function being defined
    pub fn resolve_operand(&self, name: &str) -> Option<&OperandDef> {
        self.function_operands
            .as_ref()
            .and_then(|operands| operands.iter().find(|o| o.name == name))
    }

    // === Depth Tracking ===

    pub fn depth(&self) -> ScopeDepth {
        ScopeDepth {
            queries: self.queries.len(),
            expression_contexts: self.expression_contexts.len(),
            expression_definitions: self.expression_definitions.len(),
            targets: self.targets.len(),
            in_function: self.function_operands.is_some(),
        }
    }

    /// Drop everything pushed since `depth` was taken
    pub fn restore(&mut self, depth: ScopeDepth) {
        self.queries.truncate(depth.queries);
        self.expression_contexts.truncate(depth.expression_contexts);
        self.expression_definitions.truncate(depth.expression_definitions);
        self.targets.truncate(depth.targets);
        if !depth.in_function {
            self.function_operands = None;
        }
    }
}

fn empty_stack(what: &str) -> CqlError {
    CqlError::system(CQL0400, format!("{} stack is empty.", what))
}
