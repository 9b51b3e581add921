//! The library builder
//!
//! The parse driver calls into a `LibraryBuilder` while it walks the source
//! of one library. The builder owns the ELM library under construction, the
//! scope stack and the set of models and libraries in use, and resolves
//! identifiers, member accesses and calls against them.
//!
//! Resolution failures are returned as errors. The driver wraps each
//! top-level definition in [`LibraryBuilder::translate_statement`], which
//! records non-fatal failures as diagnostics and continues.

mod calls;
mod convert;
mod resolve;

use crate::library::{Definition, TranslatedLibrary};
use crate::options::TranslatorOptions;
use crate::provider::LibraryProvider;
use crate::scope::{QueryContext, ScopeStack};
use crate::system::system_library;
use indexmap::IndexMap;
use log::{debug, warn};
use octofhir_cql_diagnostics::{CQL0102, CQL0105, CQL0107, CQL0402, CqlError, Result};
use octofhir_cql_elm::{
    Annotation, CodeDef, CodeSystemDef, ConceptDef, ContextDef, CqlToElmError, ErrorType,
    ExprArena, ExprId, ExprKind, ExpressionDef, FunctionDef, IncludeDef, Library, ParameterDef,
    QName, Statement, UsingDef, ValueSetDef, VersionedIdentifier,
};
use octofhir_cql_model::{Model, ModelCache, ModelError, ModelIdentifier};
use octofhir_cql_types::{ConversionMap, DataType, SYSTEM_MODEL_URL, SYSTEM_NAMESPACE, SystemType};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Collaborators and options of a builder
#[derive(Default)]
pub struct LibraryBuilderConfig {
    model_cache: Option<Arc<ModelCache>>,
    library_provider: Option<Arc<dyn LibraryProvider>>,
    options: TranslatorOptions,
}

impl LibraryBuilderConfig {
    /// Cache models are loaded from
    pub fn model_cache(mut self, model_cache: Arc<ModelCache>) -> Self {
        self.model_cache = Some(model_cache);
        self
    }

    /// Provider included libraries are resolved through
    pub fn library_provider(mut self, library_provider: Arc<dyn LibraryProvider>) -> Self {
        self.library_provider = Some(library_provider);
        self
    }

    pub fn options(mut self, options: TranslatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Create the builder; both collaborators are required
    pub fn build(self) -> Result<LibraryBuilder> {
        let model_cache = self
            .model_cache
            .ok_or_else(|| missing_collaborator("model cache"))?;
        let library_provider = self
            .library_provider
            .ok_or_else(|| missing_collaborator("library provider"))?;

        let mut conversions = ConversionMap::new();
        conversions.set_list_promotion(self.options.enable_list_promotion);
        conversions.set_list_demotion(self.options.enable_list_demotion);

        Ok(LibraryBuilder {
            options: self.options,
            model_cache,
            library_provider,
            library: Library::anonymous(),
            translated: TranslatedLibrary::new(None),
            models: IndexMap::new(),
            default_model: None,
            libraries: IndexMap::new(),
            conversions,
            scope: ScopeStack::new(),
            errors: Vec::new(),
        })
    }
}

fn missing_collaborator(what: &str) -> CqlError {
    CqlError::system(CQL0402, format!("A {} is required to create a library builder.", what))
}

/// Result of one translation
#[derive(Debug)]
pub struct Translation {
    /// The ELM library, including error annotations
    pub library: Library,
    /// Resolution view of the library, for use by including libraries
    pub translated: TranslatedLibrary,
    /// Every diagnostic recorded during translation
    pub errors: Vec<CqlError>,
}

/// Builder of one ELM library
pub struct LibraryBuilder {
    options: TranslatorOptions,
    model_cache: Arc<ModelCache>,
    library_provider: Arc<dyn LibraryProvider>,
    library: Library,
    translated: TranslatedLibrary,
    /// Models in use, by model name
    models: IndexMap<String, Arc<Model>>,
    default_model: Option<Arc<Model>>,
    /// Referenced libraries, by local identifier
    libraries: IndexMap<String, Arc<TranslatedLibrary>>,
    conversions: ConversionMap,
    scope: ScopeStack,
    errors: Vec<CqlError>,
}

impl LibraryBuilder {
    /// Start configuring a builder
    pub fn builder() -> LibraryBuilderConfig {
        LibraryBuilderConfig::default()
    }

    pub fn options(&self) -> &TranslatorOptions {
        &self.options
    }

    /// The ELM library under construction
    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn translated_library(&self) -> &TranslatedLibrary {
        &self.translated
    }

    pub fn arena(&self) -> &ExprArena {
        self.library.arena()
    }

    pub fn arena_mut(&mut self) -> &mut ExprArena {
        self.library.arena_mut()
    }

    /// Allocate an untyped expression node
    pub fn alloc(&mut self, kind: ExprKind) -> ExprId {
        self.arena_mut().alloc(kind)
    }

    /// Allocate an expression node with its type
    pub fn alloc_typed(&mut self, kind: ExprKind, result_type: DataType) -> ExprId {
        self.arena_mut().alloc_typed(kind, result_type)
    }

    /// Conversions available to this library
    pub fn conversions(&self) -> &ConversionMap {
        &self.conversions
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    /// Name and version of the library
    pub fn set_library_identifier(&mut self, identifier: VersionedIdentifier) {
        self.library.identifier = Some(identifier.clone());
        self.translated.set_identifier(identifier);
    }

    pub fn library_identifier(&self) -> Option<&VersionedIdentifier> {
        self.library.identifier.as_ref()
    }

    fn library_name(&self) -> &str {
        self.library
            .identifier
            .as_ref()
            .map(|i| i.id.as_str())
            .unwrap_or(&self.options.library_name)
    }

    // === Translation Lifecycle ===

    /// Load the System library and notify the library provider
    pub fn begin_translation(&mut self) -> Result<()> {
        self.load_system_library()?;
        let name = self.library_name().to_string();
        debug!("Begin translation of library {}", name);
        self.library_provider.begin_translation(&name)
    }

    /// Notify the library provider that translation ended
    pub fn end_translation(&mut self) {
        let name = self.library_name().to_string();
        debug!("End translation of library {}", name);
        self.library_provider.end_translation(&name);
    }

    /// Finish the library
    pub fn finish(self) -> Translation {
        Translation {
            library: self.library,
            translated: self.translated,
            errors: self.errors,
        }
    }

    fn load_system_library(&mut self) -> Result<()> {
        self.get_model(SYSTEM_NAMESPACE, None)?;
        if self.libraries.contains_key(SYSTEM_NAMESPACE) {
            return Ok(());
        }
        debug!("Loading System library");
        let system = Arc::new(system_library()?);
        self.conversions.add_all(system.conversions());
        self.libraries.insert(SYSTEM_NAMESPACE.to_string(), system);
        Ok(())
    }

    // === Models ===

    /// Resolve a model by id, loading it on first use
    ///
    /// The first load emits a `using` definition and merges the model's
    /// conversions. The first non-System model becomes the default model.
    pub fn get_model(&mut self, id: &str, version: Option<&str>) -> Result<Arc<Model>> {
        if let Some(model) = self.models.get(id) {
            if let (Some(requested), Some(loaded)) = (version, model.version()) {
                if requested != loaded {
                    return Err(ModelError::VersionConflict {
                        id: id.to_string(),
                        requested: requested.to_string(),
                        loaded: loaded.to_string(),
                    }
                    .into());
                }
            }
            return Ok(Arc::clone(model));
        }

        let model = self.model_cache.resolve_model(&ModelIdentifier::new(id, version))?;
        debug!("Using model {} ({})", model.name(), model.url());
        self.conversions.add_all(model.conversions());
        if self.default_model.is_none() && !model.is_system() {
            self.default_model = Some(Arc::clone(&model));
        }
        self.library.add_using(UsingDef {
            local_identifier: id.to_string(),
            uri: model.url().to_string(),
            version: model.version().map(String::from),
        });
        self.models.insert(id.to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// Model used under `name`
    pub fn model(&self, name: &str) -> Result<Arc<Model>> {
        self.models.get(name).cloned().ok_or_else(|| {
            CqlError::semantic(CQL0105, format!("Could not resolve model name {}", name))
        })
    }

    /// Model in use whose own name is `name`, whatever its local identifier
    pub fn model_by_name(&self, name: &str) -> Result<Arc<Model>> {
        self.models
            .values()
            .find(|model| model.name() == name)
            .cloned()
            .ok_or_else(|| {
                CqlError::semantic(CQL0105, format!("Could not resolve model name {}", name))
            })
    }

    /// The first non-System model in use
    pub fn default_model(&self) -> Option<&Arc<Model>> {
        self.default_model.as_ref()
    }

    /// Whether any non-System model is in use
    pub fn has_usings(&self) -> bool {
        self.models.values().any(|m| !m.is_system())
    }

    // === Definitions ===

    /// Include another library; the including library must be named
    pub fn add_include(&mut self, def: IncludeDef) -> Result<()> {
        if self.library.identifier.is_none() {
            return Err(CqlError::semantic(
                CQL0107,
                "Unnamed libraries cannot reference other libraries.",
            ));
        }
        self.translated.add(Definition::Include(def.clone()))?;
        self.library.add_include(def.clone());

        let identifier = VersionedIdentifier::new(def.path.clone(), def.version.as_deref());
        debug!("Resolving include {} as {}", identifier, def.local_identifier);
        let mut errors = Vec::new();
        let resolved = self.library_provider.resolve_library(&identifier, &mut errors);
        for error in errors {
            self.record_parsing_exception(error);
        }
        if let Some(library) = resolved {
            self.conversions.add_all(library.conversions());
            self.libraries.insert(def.local_identifier, library);
        }
        Ok(())
    }

    pub fn add_parameter(&mut self, def: ParameterDef) -> Result<()> {
        self.translated.add(Definition::Parameter(def.clone()))?;
        self.library.add_parameter(def);
        Ok(())
    }

    pub fn add_code_system(&mut self, def: CodeSystemDef) -> Result<()> {
        self.translated.add(Definition::CodeSystem(def.clone()))?;
        self.library.add_code_system(def);
        Ok(())
    }

    pub fn add_value_set(&mut self, def: ValueSetDef) -> Result<()> {
        self.translated.add(Definition::ValueSet(def.clone()))?;
        self.library.add_value_set(def);
        Ok(())
    }

    pub fn add_code(&mut self, def: CodeDef) -> Result<()> {
        self.translated.add(Definition::Code(def.clone()))?;
        self.library.add_code(def);
        Ok(())
    }

    pub fn add_concept(&mut self, def: ConceptDef) -> Result<()> {
        self.translated.add(Definition::Concept(def.clone()))?;
        self.library.add_concept(def);
        Ok(())
    }

    pub fn add_context(&mut self, def: ContextDef) {
        self.library.add_context(def);
    }

    pub fn add_expression(&mut self, def: ExpressionDef) -> Result<()> {
        self.translated.add(Definition::Expression(def.clone()))?;
        self.library.add_statement(Statement::Expression(def));
        Ok(())
    }

    /// Add a function; overloads share a name
    pub fn add_function(&mut self, def: FunctionDef) -> Result<()> {
        let exported = self.translated.conversions().len();
        self.translated.add_function(&def)?;
        self.conversions
            .add_all(&self.translated.conversions()[exported..]);
        self.library.add_statement(Statement::Function(def));
        Ok(())
    }

    // === Diagnostics ===

    /// Diagnostics recorded so far
    pub fn errors(&self) -> &[CqlError] {
        &self.errors
    }

    /// Record a failure and mirror it as an annotation on the library
    pub fn record_parsing_exception(&mut self, error: CqlError) {
        let error_type = match &error {
            CqlError::Include { .. } => ErrorType::Include,
            CqlError::Parse { .. } => ErrorType::Syntax,
            CqlError::System { .. } => ErrorType::Internal,
            _ => ErrorType::Semantic,
        };
        let mut annotation = CqlToElmError::new(error.message(), error_type);
        if let Some(identifier) = &self.library.identifier {
            annotation.library_id = Some(identifier.id.clone());
            annotation.library_version = identifier.version.clone();
        }
        if let Some(locator) = error.locator() {
            annotation.start_line = u32::try_from(locator.start_line).ok();
            annotation.start_char = u32::try_from(locator.start_char).ok();
            annotation.end_line = u32::try_from(locator.end_line).ok();
            annotation.end_char = u32::try_from(locator.end_char).ok();
        }
        if let CqlError::Include { library_id, version, .. } = &error {
            annotation.target_include_library_id = Some(library_id.clone());
            annotation.target_include_library_version_id = version.clone();
        }
        self.library.add_annotation(Annotation::CqlToElmError(annotation));
        self.errors.push(error);
    }

    /// Translate one top-level definition
    ///
    /// Runs `f` inside the definition-cycle guard. Non-fatal failures are
    /// recorded and yield `Ok(None)`; fatal ones are returned. Every stack is
    /// restored to its depth on entry.
    pub fn translate_statement<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<Option<R>> {
        let depth = self.scope.depth();
        let result = self
            .scope
            .push_expression_definition(name)
            .and_then(|()| f(self));
        self.scope.restore(depth);

        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                warn!("Error translating {}: {}", name, error);
                self.record_parsing_exception(error);
                Ok(None)
            }
        }
    }

    // === Scopes ===

    pub fn push_query_context(&mut self, context: QueryContext) {
        self.scope.push_query(context);
    }

    pub fn pop_query_context(&mut self) -> Result<QueryContext> {
        self.scope.pop_query()
    }

    pub fn peek_query_context(&self) -> Option<&QueryContext> {
        self.scope.peek_query()
    }

    pub fn peek_query_context_mut(&mut self) -> Option<&mut QueryContext> {
        self.scope.peek_query_mut()
    }

    pub fn in_query_context(&self) -> bool {
        self.scope.in_query()
    }

    /// Run `f` inside a query frame; returns the frame as it was left
    pub fn with_query_context<R>(
        &mut self,
        context: QueryContext,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<(R, QueryContext)> {
        let depth = self.scope.depth();
        self.scope.push_query(context);
        let result = f(self);
        let context = self.scope.pop_query();
        self.scope.restore(depth);
        Ok((result?, context?))
    }

    pub fn push_expression_context(&mut self, context: impl Into<String>) {
        self.scope.push_expression_context(context);
    }

    pub fn pop_expression_context(&mut self) -> Result<String> {
        self.scope.pop_expression_context()
    }

    pub fn current_expression_context(&self) -> Result<&str> {
        self.scope.current_expression_context()
    }

    /// Run `f` in the expression context `context`
    pub fn with_expression_context<R>(
        &mut self,
        context: &str,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let depth = self.scope.depth();
        self.scope.push_expression_context(context);
        let result = f(self);
        self.scope.restore(depth);
        result
    }

    pub fn in_record_context(&self) -> Result<bool> {
        Ok(self.current_expression_context()? == self.options.record_context)
    }

    pub fn in_population_context(&self) -> Result<bool> {
        Ok(self.current_expression_context()? == self.options.population_context)
    }

    pub fn push_expression_definition(&mut self, identifier: &str) -> Result<()> {
        self.scope.push_expression_definition(identifier)
    }

    pub fn pop_expression_definition(&mut self) -> Result<String> {
        self.scope.pop_expression_definition()
    }

    pub fn push_expression_target(&mut self, target: ExprId) {
        self.scope.push_target(target);
    }

    pub fn pop_expression_target(&mut self) -> Result<ExprId> {
        self.scope.pop_target()
    }

    pub fn has_expression_target(&self) -> bool {
        self.scope.has_target()
    }

    /// Make the operands of `def` visible to identifier resolution
    pub fn begin_function_def(&mut self, def: &FunctionDef) {
        self.scope.begin_function(def.operand.clone());
    }

    pub fn end_function_def(&mut self) {
        self.scope.end_function();
    }

    /// Run `f` while defining the function `def`
    pub fn with_function_def<R>(
        &mut self,
        def: &FunctionDef,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.begin_function_def(def);
        let result = f(self);
        self.end_function_def();
        result
    }

    // === Literals ===

    /// Literal of a System type (`Integer`, `Decimal`, `String`, ...)
    pub fn create_literal(&mut self, value: impl Into<String>, type_name: &str) -> Result<ExprId> {
        let system = SystemType::from_name(type_name).ok_or_else(|| {
            CqlError::semantic(CQL0102, format!("Could not resolve type name {}.", type_name))
        })?;
        Ok(self.alloc_typed(
            ExprKind::Literal {
                value_type: QName::new(SYSTEM_MODEL_URL, system.name()),
                value: value.into(),
            },
            system.data_type(),
        ))
    }

    pub fn create_null(&mut self) -> ExprId {
        self.alloc_typed(ExprKind::Null, DataType::Any)
    }

    pub fn create_quantity(&mut self, value: Decimal, unit: impl Into<String>) -> ExprId {
        self.alloc_typed(
            ExprKind::Quantity {
                value,
                unit: unit.into(),
            },
            SystemType::Quantity.data_type(),
        )
    }
}

impl std::fmt::Debug for LibraryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryBuilder")
            .field("library", &self.library_name())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("libraries", &self.libraries.keys().collect::<Vec<_>>())
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}
