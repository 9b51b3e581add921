//! Operator and function call resolution

use super::LibraryBuilder;
use crate::library::TranslatedLibrary;
use crate::system::instantiate_result_type;
use log::trace;
use octofhir_cql_diagnostics::{CQL0101, CQL0103, CQL0106, CQL0116, CqlError, Result};
use octofhir_cql_elm::{ExprId, ExprKind, NamedRef, NativeOperator, Operands};
use octofhir_cql_types::{
    AccessLevel, CallContext, OperatorResolution, SYSTEM_NAMESPACE, Signature,
};
use std::sync::Arc;

impl LibraryBuilder {
    /// Referenced library by local identifier
    pub fn resolve_library(&self, name: &str) -> Result<Arc<TranslatedLibrary>> {
        self.libraries.get(name).cloned().ok_or_else(|| {
            CqlError::semantic(CQL0103, format!("Could not resolve library name {}.", name))
        })
    }

    /// Fail when a private definition is referenced from another library
    pub fn check_access_level(
        &self,
        library_name: &str,
        object_name: &str,
        access_level: AccessLevel,
    ) -> Result<()> {
        let current = self.library_identifier().map(|i| i.id.as_str());
        if access_level == AccessLevel::Private && current != Some(library_name) {
            return Err(CqlError::semantic(
                CQL0116,
                format!(
                    "Object {} in library {} is marked private and cannot be referenced from another library.",
                    object_name, library_name
                ),
            ));
        }
        Ok(())
    }

    /// Resolve the operator an invocation node calls
    ///
    /// On success the operands of `invocation` are rewritten with the
    /// conversions the chosen overload needs and the node is typed with the
    /// overload's result type.
    pub fn resolve_call(
        &mut self,
        library_name: Option<&str>,
        operator_name: &str,
        invocation: ExprId,
        must_resolve: bool,
    ) -> Result<Option<OperatorResolution>> {
        let operands: Vec<ExprId> = self.arena().kind(invocation).operands().to_vec();
        let mut operand_types = Vec::with_capacity(operands.len());
        for operand in &operands {
            let operand_type = self.arena().result_type(*operand).cloned().ok_or_else(|| {
                CqlError::semantic(
                    CQL0106,
                    format!(
                        "Could not determine signature for invocation of operator {}{}.",
                        library_name.map(|l| format!("{}.", l)).unwrap_or_default(),
                        operator_name
                    ),
                )
            })?;
            operand_types.push(operand_type);
        }

        let call = CallContext::new(
            library_name.map(String::from),
            operator_name,
            Signature::new(operand_types),
        );
        let Some(resolution) = self.find_operator(&call)? else {
            if must_resolve {
                return Err(CqlError::semantic(
                    CQL0101,
                    format!(
                        "Could not resolve call to operator {} with signature {}.",
                        operator_name, call.signature
                    ),
                ));
            }
            return Ok(None);
        };
        trace!("Resolved {} to {}", call, resolution.operator());

        let mut converted = Operands::with_capacity(operands.len());
        for (operand, conversion) in operands.iter().zip(resolution.conversions()) {
            converted.push(match conversion {
                Some(conversion) => self.convert_expression(*operand, conversion)?,
                None => *operand,
            });
        }
        let actual_types: Vec<_> = converted
            .iter()
            .map(|operand| self.arena().result_type(*operand).cloned().unwrap_or_default())
            .collect();
        if resolution.has_conversions() {
            self.arena_mut()[invocation].kind.set_operands(converted);
        }

        let operator = resolution.operator();
        let result_type = instantiate_result_type(operator, &actual_types)
            .unwrap_or_else(|| operator.result_type().clone());
        self.arena_mut().set_result_type(invocation, result_type);
        Ok(Some(resolution))
    }

    /// Search for the best overload
    ///
    /// Unqualified calls search the current library and then System. Calls
    /// qualified with another library also check access.
    fn find_operator(&self, call: &CallContext) -> Result<Option<OperatorResolution>> {
        let current = self.library_identifier().map(|i| i.id.as_str());
        match call.library_name.as_deref() {
            Some(library_name) if Some(library_name) != current => {
                let library = self.resolve_library(library_name)?;
                let resolution = library.resolve_call(call, &self.conversions)?;
                if let Some(resolution) = &resolution {
                    self.check_access_level(
                        library_name,
                        &call.operator_name,
                        resolution.operator().access_level(),
                    )?;
                }
                Ok(resolution)
            }
            Some(_) => self.translated.resolve_call(call, &self.conversions),
            None => {
                if let Some(resolution) = self.translated.resolve_call(call, &self.conversions)? {
                    return Ok(Some(resolution));
                }
                match self.libraries.get(SYSTEM_NAMESPACE) {
                    Some(system) => system.resolve_call(call, &self.conversions),
                    None => Ok(None),
                }
            }
        }
    }

    /// Build and resolve a call to `name`
    ///
    /// Unqualified or System-qualified names of built-in operators become
    /// native operator nodes unless the current library defines a function
    /// with that name. Everything else becomes a function reference.
    pub fn resolve_function(
        &mut self,
        library_name: Option<&str>,
        name: &str,
        operands: Vec<ExprId>,
    ) -> Result<ExprId> {
        if library_name.is_none_or(|l| l == SYSTEM_NAMESPACE) {
            if let Some(operator) = NativeOperator::from_name(name) {
                if library_name.is_some() || !self.translated.operators().contains(name) {
                    return self.resolve_native(operator, operands);
                }
            }
        }

        let invocation = self.alloc(ExprKind::FunctionRef {
            target: NamedRef::new(library_name, name),
            operands: operands.into(),
        });
        self.resolve_call(library_name, name, invocation, true)?;
        Ok(invocation)
    }

    /// Build and resolve a built-in operator node
    pub fn resolve_native(
        &mut self,
        operator: NativeOperator,
        operands: Vec<ExprId>,
    ) -> Result<ExprId> {
        let invocation = self.alloc(ExprKind::Native {
            operator,
            operands: operands.into(),
        });
        self.resolve_call(Some(SYSTEM_NAMESPACE), operator.name(), invocation, true)?;
        Ok(invocation)
    }
}
