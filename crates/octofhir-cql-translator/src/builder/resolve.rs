//! Name resolution: type names, properties, identifiers and accessors

use super::LibraryBuilder;
use crate::library::Definition;
use crate::scope::THIS_ALIAS;
use log::trace;
use octofhir_cql_diagnostics::{
    CQL0100, CQL0102, CQL0104, CQL0106, CQL0112, CQL0118, CqlError, Result,
};
use octofhir_cql_elm::{
    AliasedQuerySource, ExprId, ExprKind, ExpressionDef, NamedRef, NativeOperator, Query,
    ReturnClause,
};
use octofhir_cql_types::{DataType, SystemType};
use smallvec::smallvec;

impl LibraryBuilder {
    // === Types ===

    /// Resolve a type label
    ///
    /// A qualified label is looked up in that model only. An unqualified label
    /// is searched across every model in use.
    pub fn resolve_label(&self, model_name: Option<&str>, label: &str) -> Result<Option<DataType>> {
        if let Some(model_name) = model_name {
            return Ok(self.model(model_name)?.resolve_label(label).cloned());
        }

        let mut result: Option<DataType> = None;
        for model in self.models.values() {
            if let Some(found) = model.resolve_label(label) {
                match &result {
                    Some(existing) if existing != found => {
                        return Err(CqlError::semantic(
                            CQL0112,
                            format!(
                                "Label {} is ambiguous between {} and {}.",
                                label, existing, found
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => result = Some(found.clone()),
                }
            }
        }
        Ok(result)
    }

    /// Resolve a type name, optionally qualified by a model name
    ///
    /// Labels take precedence. An unqualified name is looked up in the default
    /// model first and then across every model in use, where more than one
    /// match is ambiguous.
    pub fn resolve_type_name(
        &self,
        model_name: Option<&str>,
        name: &str,
    ) -> Result<Option<DataType>> {
        if let Some(labelled) = self.resolve_label(model_name, name)? {
            return Ok(Some(labelled));
        }

        if let Some(model_name) = model_name {
            return Ok(self.model(model_name)?.resolve_type_name(name).cloned());
        }

        if let Some(found) = self
            .default_model
            .as_ref()
            .and_then(|model| model.resolve_type_name(name))
        {
            return Ok(Some(found.clone()));
        }

        let mut result: Option<DataType> = None;
        for model in self.models.values() {
            if let Some(found) = model.resolve_type_name(name) {
                if let Some(existing) = &result {
                    return Err(CqlError::semantic(
                        CQL0112,
                        format!(
                            "Type name {} is ambiguous between {} and {}.",
                            name, existing, found
                        ),
                    ));
                }
                result = Some(found.clone());
            }
        }
        Ok(result)
    }

    /// Resolve a type name that must exist
    pub fn require_type_name(&self, model_name: Option<&str>, name: &str) -> Result<DataType> {
        self.resolve_type_name(model_name, name)?.ok_or_else(|| {
            let qualified = match model_name {
                Some(model) => format!("{}.{}", model, name),
                None => name.to_string(),
            };
            CqlError::semantic(CQL0102, format!("Could not resolve type name {}.", qualified))
        })
    }

    // === Properties ===

    /// Type of `member` on `source_type`
    pub fn resolve_property(
        &self,
        source_type: &DataType,
        member: &str,
        must_resolve: bool,
    ) -> Result<Option<DataType>> {
        let resolved = source_type.resolve_property(member)?;
        if resolved.is_none() && must_resolve {
            return Err(CqlError::semantic(
                CQL0104,
                format!("Member {} not found for type {}.", member, source_type),
            ));
        }
        Ok(resolved)
    }

    /// Type at the end of a dotted member path
    pub fn resolve_path(&self, source_type: &DataType, path: &str) -> Result<DataType> {
        path.split('.').try_fold(source_type.clone(), |current, member| {
            self.resolve_property(&current, member, true)?
                .ok_or_else(|| unresolved_member(member, &current))
        })
    }

    // === Identifiers ===

    /// Resolve an identifier in scope order
    ///
    /// Result elements of an enclosing sort clause come first, then members of
    /// an implicit `$this` element, aliases, let bindings, function operands
    /// and finally library-level definitions.
    pub fn resolve_identifier(
        &mut self,
        identifier: &str,
        must_resolve: bool,
    ) -> Result<Option<ExprId>> {
        trace!("Resolving identifier {}", identifier);

        if let Some(result) = self.resolve_query_result_element(identifier)? {
            return Ok(Some(result));
        }

        if let Some(result) = self.resolve_query_this_element(identifier)? {
            return Ok(Some(result));
        }

        if let Some(source) = self.scope.resolve_alias(identifier) {
            let result_type = source.element_type().clone();
            let name = source.alias.clone();
            return Ok(Some(self.alloc_typed(ExprKind::AliasRef { name }, result_type)));
        }

        if let Some(binding) = self.scope.resolve_let(identifier) {
            let result_type = binding.result_type.clone();
            let name = binding.identifier.clone();
            return Ok(Some(self.alloc_typed(ExprKind::QueryLetRef { name }, result_type)));
        }

        if let Some(operand) = self.scope.resolve_operand(identifier) {
            let result_type = operand.result_type.clone();
            let name = operand.name.clone();
            return Ok(Some(self.alloc_typed(ExprKind::OperandRef { name }, result_type)));
        }

        if let Some(definition) = self.translated.resolve(identifier).cloned() {
            return self.definition_ref(None, &definition).map(Some);
        }

        if must_resolve {
            return Err(CqlError::semantic(
                CQL0100,
                format!("Could not resolve identifier {} in the current library.", identifier),
            ));
        }
        Ok(None)
    }

    /// Element of the query result inside a sort clause
    fn resolve_query_result_element(&mut self, identifier: &str) -> Result<Option<ExprId>> {
        let element_type = match self.scope.peek_query() {
            Some(query) if query.in_sort_clause() && !query.is_singular() => {
                query.result_element_type().cloned()
            }
            _ => None,
        };
        let Some(element_type) = element_type else {
            return Ok(None);
        };
        match self.resolve_property(&element_type, identifier, false)? {
            Some(result_type) => Ok(Some(self.alloc_typed(
                ExprKind::IdentifierRef(NamedRef::new(None, identifier)),
                result_type,
            ))),
            None => Ok(None),
        }
    }

    /// Member of the element an implicit `$this` frame ranges over
    fn resolve_query_this_element(&mut self, identifier: &str) -> Result<Option<ExprId>> {
        let element_type = match self.scope.peek_query() {
            Some(query) if query.is_implicit() => query
                .resolve_alias(THIS_ALIAS)
                .map(|source| source.element_type().clone()),
            _ => None,
        };
        let Some(element_type) = element_type else {
            return Ok(None);
        };
        if self.resolve_property(&element_type, identifier, false)?.is_none() {
            return Ok(None);
        }
        let this = self.alloc_typed(
            ExprKind::AliasRef {
                name: THIS_ALIAS.to_string(),
            },
            element_type,
        );
        self.resolve_accessor(this, identifier).map(Some)
    }

    /// Reference to a library-level definition
    fn definition_ref(
        &mut self,
        library_name: Option<&str>,
        definition: &Definition,
    ) -> Result<ExprId> {
        let name = definition.name();
        let reference = NamedRef::new(library_name, name);
        let kind = match definition {
            Definition::Include(include) => {
                if let Some(library_name) = library_name {
                    return Err(CqlError::semantic(
                        CQL0100,
                        format!(
                            "Could not resolve identifier {} in library {}.",
                            name, library_name
                        ),
                    ));
                }
                return Ok(self.alloc(ExprKind::LibraryRef {
                    library_name: include.local_identifier.clone(),
                }));
            }
            Definition::Expression(def) => {
                let result_type = self.expression_def_result_type(def)?;
                return Ok(self.alloc_typed(ExprKind::ExpressionRef(reference), result_type));
            }
            Definition::Parameter(_) => ExprKind::ParameterRef(reference),
            Definition::CodeSystem(_) => ExprKind::CodeSystemRef(reference),
            Definition::ValueSet(_) => ExprKind::ValueSetRef(reference),
            Definition::Code(_) => ExprKind::CodeRef(reference),
            Definition::Concept(_) => ExprKind::ConceptRef(reference),
        };
        Ok(match definition.result_type() {
            Some(result_type) => self.alloc_typed(kind, result_type),
            None => self.alloc(kind),
        })
    }

    // === Evaluation Context ===

    /// Type of a reference to `def` from the current expression context
    ///
    /// A record-context definition referenced from population context is a
    /// list with one entry per record, and marks the enclosing query source
    /// as crossing contexts.
    pub fn expression_def_result_type(&mut self, def: &ExpressionDef) -> Result<DataType> {
        let result_type = def.result_type.clone().ok_or_else(|| {
            CqlError::semantic(
                CQL0106,
                format!("Could not determine the type of expression {}.", def.name),
            )
        })?;

        let current = self.current_expression_context()?.to_string();
        let Some(def_context) = def.context.as_deref() else {
            return Ok(result_type);
        };
        if def_context == current {
            return Ok(result_type);
        }

        let record = self.options.record_context.as_str();
        let population = self.options.population_context.as_str();
        if current == record && def_context == population {
            return Ok(result_type);
        }
        if current == population && def_context == record {
            if let Some(query) = self.scope.peek_query_mut() {
                if query.in_source_clause() {
                    query.reference_record_context();
                }
            }
            return Ok(if result_type.is_list() {
                result_type
            } else {
                DataType::list(result_type)
            });
        }

        Err(CqlError::semantic(
            CQL0118,
            format!(
                "Invalid context reference from {} context to {} context.",
                current, def_context
            ),
        ))
    }

    // === Accessors ===

    /// Resolve `left.member`
    ///
    /// `left` may be a library reference, an alias, a list (the member is
    /// taken from every element) or any structured value.
    pub fn resolve_accessor(&mut self, left: ExprId, member: &str) -> Result<ExprId> {
        trace!("Resolving accessor .{}", member);

        match self.arena().kind(left).clone() {
            ExprKind::LibraryRef { library_name } => {
                return self.resolve_library_member(&library_name, member);
            }
            ExprKind::AliasRef { name } => {
                let source_type = self.arena().result_type(left).cloned().unwrap_or_default();
                let result_type = self.require_property(&source_type, member)?;
                return Ok(self.alloc_typed(
                    ExprKind::Property {
                        source: None,
                        path: member.to_string(),
                        scope: Some(name),
                    },
                    result_type,
                ));
            }
            _ => {}
        }

        let left_type = self.arena().result_type(left).cloned().unwrap_or_default();
        if let Some(element_type) = left_type.element_type().cloned() {
            return self.resolve_list_accessor(left, &element_type, member);
        }

        let result_type = self.require_property(&left_type, member)?;
        Ok(self.alloc_typed(
            ExprKind::Property {
                source: Some(left),
                path: member.to_string(),
                scope: None,
            },
            result_type,
        ))
    }

    /// `list.member` becomes a query over the list that skips null members and
    /// flattens list-valued members
    fn resolve_list_accessor(
        &mut self,
        left: ExprId,
        element_type: &DataType,
        member: &str,
    ) -> Result<ExprId> {
        let member_type = self.require_property(element_type, member)?;
        let boolean = SystemType::Boolean.data_type();

        let this_property = |builder: &mut Self| {
            let this = builder.alloc_typed(
                ExprKind::AliasRef {
                    name: THIS_ALIAS.to_string(),
                },
                element_type.clone(),
            );
            builder.alloc_typed(
                ExprKind::Property {
                    source: Some(this),
                    path: member.to_string(),
                    scope: None,
                },
                member_type.clone(),
            )
        };

        let tested = this_property(self);
        let is_null = self.alloc_typed(
            ExprKind::Native {
                operator: NativeOperator::IsNull,
                operands: smallvec![tested],
            },
            boolean.clone(),
        );
        let not_null = self.alloc_typed(
            ExprKind::Native {
                operator: NativeOperator::Not,
                operands: smallvec![is_null],
            },
            boolean,
        );
        let returned = this_property(self);

        let query = Query {
            sources: vec![AliasedQuerySource {
                alias: THIS_ALIAS.to_string(),
                expression: left,
            }],
            lets: Vec::new(),
            where_clause: Some(not_null),
            return_clause: Some(ReturnClause {
                expression: returned,
                distinct: true,
            }),
        };
        let query = self.alloc_typed(
            ExprKind::Query(Box::new(query)),
            DataType::list(member_type.clone()),
        );

        match member_type.element_type().cloned() {
            Some(flattened) => Ok(self.alloc_typed(
                ExprKind::Native {
                    operator: NativeOperator::Flatten,
                    operands: smallvec![query],
                },
                DataType::list(flattened),
            )),
            None => Ok(query),
        }
    }

    /// `Library.member`
    fn resolve_library_member(&mut self, library_name: &str, member: &str) -> Result<ExprId> {
        let library = self.resolve_library(library_name)?;
        let definition = library.resolve(member).cloned().ok_or_else(|| {
            CqlError::semantic(
                CQL0100,
                format!("Could not resolve identifier {} in library {}.", member, library_name),
            )
        })?;
        self.check_access_level(library_name, member, definition.access_level())?;
        self.definition_ref(Some(library_name), &definition)
    }

    fn require_property(&self, source_type: &DataType, member: &str) -> Result<DataType> {
        self.resolve_property(source_type, member, true)?
            .ok_or_else(|| unresolved_member(member, source_type))
    }
}

fn unresolved_member(member: &str, source_type: &DataType) -> CqlError {
    CqlError::semantic(
        CQL0104,
        format!("Member {} not found for type {}.", member, source_type),
    )
}
