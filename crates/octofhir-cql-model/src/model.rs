//! Resolved type catalogs
//!
//! A `Model` is the runtime form of a `ModelInfo`: every type reference is
//! resolved to a `DataType`, base types are linked and the exported
//! conversions are ready to merge into a `ConversionMap`.

use crate::error::ModelError;
use crate::model_info::{parse_type_reference, ModelInfo, TypeInfo, TypeReference};
use indexmap::IndexMap;
use octofhir_cql_types::{
    ClassTypeElement, Conversion, DataType, NamedType, Operator, SYSTEM_MODEL_URL,
    SYSTEM_NAMESPACE, Signature, SystemType,
};

/// A loaded type catalog
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    version: Option<String>,
    url: String,
    patient_class_name: Option<String>,
    types: IndexMap<String, DataType>,
    labels: IndexMap<String, DataType>,
    conversions: Vec<Conversion>,
}

impl Model {
    /// The built-in `System` model
    pub fn system() -> Self {
        let types = SystemType::ALL
            .iter()
            .map(|t| (t.qualified_name(), t.data_type()))
            .collect();
        Self {
            name: SYSTEM_NAMESPACE.to_string(),
            version: None,
            url: SYSTEM_MODEL_URL.to_string(),
            patient_class_name: None,
            types,
            labels: IndexMap::new(),
            conversions: Vec::new(),
        }
    }

    /// Resolve a `ModelInfo` against the `System` model
    ///
    /// Types are created base-first so each one links to its resolved base;
    /// elements are attached once every type exists, which allows element
    /// types to refer back to their owner.
    pub fn from_model_info(info: &ModelInfo, system: &Model) -> Result<Self, ModelError> {
        let mut builder = ModelBuilder {
            info,
            system,
            types: IndexMap::new(),
            in_progress: Vec::new(),
        };
        for type_info in &info.type_infos {
            builder.build_type(type_info)?;
        }

        for type_info in &info.type_infos {
            let qualified = builder.qualify(&type_info.name);
            let elements = type_info
                .elements
                .iter()
                .map(|element| {
                    let element_type = builder.resolve_reference(&element.element_type)?;
                    Ok(if element.prohibited {
                        ClassTypeElement::prohibited(&element.name, element_type)
                    } else {
                        ClassTypeElement::new(&element.name, element_type)
                    })
                })
                .collect::<Result<Vec<_>, ModelError>>()?;
            if let Some(named) = builder.types.get(&qualified).and_then(DataType::as_named) {
                named.set_elements(elements)?;
            }
        }

        let mut labels = IndexMap::new();
        for type_info in &info.type_infos {
            if let Some(label) = &type_info.label {
                if let Some(data_type) = builder.types.get(&builder.qualify(&type_info.name)) {
                    labels.insert(label.clone(), data_type.clone());
                }
            }
        }

        let mut conversions = Vec::with_capacity(info.conversion_infos.len());
        for conversion in &info.conversion_infos {
            let from = builder.resolve_reference(&conversion.from_type)?;
            let to = builder.resolve_reference(&conversion.to_type)?;
            conversions.push(match &conversion.function_name {
                Some(function) => {
                    let signature = Signature::new(vec![from]);
                    let operator = match function.rsplit_once('.') {
                        Some((library, name)) => {
                            Operator::new(name, signature, to).with_library(library)
                        }
                        None => Operator::new(function.as_str(), signature, to),
                    };
                    Conversion::operator(operator, conversion.implicit)
                }
                None => Conversion::primitive(from, to, conversion.implicit),
            });
        }

        Ok(Self {
            name: info.name.clone(),
            version: info.version.clone(),
            url: info.url.clone(),
            patient_class_name: info.patient_class_name.clone(),
            types: builder.types,
            labels,
            conversions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn patient_class_name(&self) -> Option<&str> {
        self.patient_class_name.as_deref()
    }

    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_NAMESPACE
    }

    /// Resolve a simple or model-qualified type name
    pub fn resolve_type_name(&self, name: &str) -> Option<&DataType> {
        let simple = name
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name);
        self.types.get(&format!("{}.{}", self.name, simple))
    }

    /// Resolve a type label
    pub fn resolve_label(&self, label: &str) -> Option<&DataType> {
        self.labels.get(label)
    }

    /// All types in declaration order
    pub fn types(&self) -> impl Iterator<Item = &DataType> {
        self.types.values()
    }

    /// Conversions exported by this model
    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }
}

struct ModelBuilder<'a> {
    info: &'a ModelInfo,
    system: &'a Model,
    types: IndexMap<String, DataType>,
    in_progress: Vec<String>,
}

impl ModelBuilder<'_> {
    fn qualify(&self, name: &str) -> String {
        format!("{}.{}", self.info.name, self.info.simple_name(name))
    }

    fn build_type(&mut self, type_info: &TypeInfo) -> Result<DataType, ModelError> {
        let qualified = self.qualify(&type_info.name);
        if let Some(existing) = self.types.get(&qualified) {
            return Ok(existing.clone());
        }
        if self.in_progress.contains(&qualified) {
            return Err(ModelError::InheritanceCycle(qualified));
        }

        self.in_progress.push(qualified.clone());
        let base = match &type_info.base_type {
            Some(base) => Some(self.resolve_base(base)?),
            None => None,
        };
        self.in_progress.pop();

        let simple_name = self.info.simple_name(&type_info.name);
        let mut named = NamedType::new(&self.info.name, simple_name, base);
        if let Some(label) = &type_info.label {
            named = named.with_label(label);
        }
        let data_type = DataType::named(named);
        self.types.insert(qualified, data_type.clone());
        Ok(data_type)
    }

    fn resolve_base(&mut self, name: &str) -> Result<DataType, ModelError> {
        let info = self.info;
        match info.get_type(name) {
            Some(base_info) if !self.is_system_name(name) => self.build_type(base_info),
            _ => self.resolve_named(name),
        }
    }

    fn is_system_name(&self, name: &str) -> bool {
        name.starts_with("System.") && self.info.name != SYSTEM_NAMESPACE
    }

    fn resolve_reference(&self, text: &str) -> Result<DataType, ModelError> {
        let reference = parse_type_reference(text)?;
        self.resolve_parsed(&reference)
    }

    fn resolve_parsed(&self, reference: &TypeReference) -> Result<DataType, ModelError> {
        Ok(match reference {
            TypeReference::Named(name) => self.resolve_named(name)?,
            TypeReference::List(element) => DataType::list(self.resolve_parsed(element)?),
            TypeReference::Interval(point) => DataType::interval(self.resolve_parsed(point)?),
            TypeReference::Choice(alternatives) => DataType::choice(
                alternatives
                    .iter()
                    .map(|alternative| self.resolve_parsed(alternative))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }

    fn resolve_named(&self, name: &str) -> Result<DataType, ModelError> {
        if !self.is_system_name(name) {
            if let Some(found) = self.types.get(&self.qualify(name)) {
                return Ok(found.clone());
            }
        }
        self.system
            .resolve_type_name(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownType {
                model: self.info.name.clone(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_info::{ConversionInfo, ElementInfo};

    fn test_info() -> ModelInfo {
        ModelInfo::new("Test", Some("1.0"), "http://test.org/model")
            .with_type(
                TypeInfo::new("Patient")
                    .with_base("Test.DomainResource")
                    .with_label("Person")
                    .with_element(ElementInfo::new("name", "Test.HumanName"))
                    .with_element(ElementInfo::new("birthDate", "System.Date")),
            )
            .with_type(TypeInfo::new("DomainResource").with_base("Test.Resource"))
            .with_type(
                TypeInfo::new("Resource").with_element(ElementInfo::new("id", "System.String")),
            )
            .with_type(
                TypeInfo::new("HumanName")
                    .with_element(ElementInfo::new("given", "List<System.String>"))
                    .with_element(ElementInfo::new("owner", "Test.Patient"))
                    .with_element(ElementInfo::new("internal", "System.String").prohibited()),
            )
            .with_type(
                TypeInfo::new("code").with_element(ElementInfo::new("value", "System.String")),
            )
            .with_conversion(ConversionInfo::new(
                "Test.code",
                "System.String",
                Some("TestHelpers.ToString"),
            ))
    }

    #[test]
    fn test_inheritance_links() {
        let model = Model::from_model_info(&test_info(), &Model::system()).unwrap();
        let patient = model.resolve_type_name("Patient").unwrap();
        let resource = model.resolve_type_name("Test.Resource").unwrap();
        assert!(resource.is_super_type_of(patient));
        assert_eq!(
            patient.resolve_property("id").unwrap(),
            Some(SystemType::String.data_type())
        );
    }

    #[test]
    fn test_cyclic_element_types() {
        let model = Model::from_model_info(&test_info(), &Model::system()).unwrap();
        let name = model.resolve_type_name("HumanName").unwrap();
        assert_eq!(
            name.resolve_property("owner").unwrap().as_ref(),
            model.resolve_type_name("Patient")
        );
        assert!(name.resolve_property("internal").is_err());
    }

    #[test]
    fn test_labels_and_conversions() {
        let model = Model::from_model_info(&test_info(), &Model::system()).unwrap();
        assert_eq!(model.resolve_label("Person"), model.resolve_type_name("Patient"));
        let conversion = &model.conversions()[0];
        assert_eq!(conversion.operator_ref().unwrap().library_name(), Some("TestHelpers"));
        assert!(conversion.is_implicit());
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let info = ModelInfo::new("Loop", None, "")
            .with_type(TypeInfo::new("A").with_base("Loop.B"))
            .with_type(TypeInfo::new("B").with_base("Loop.A"));
        assert!(matches!(
            Model::from_model_info(&info, &Model::system()),
            Err(ModelError::InheritanceCycle(_))
        ));
    }

    #[test]
    fn test_unknown_element_type() {
        let info = ModelInfo::new("Bad", None, "")
            .with_type(TypeInfo::new("A").with_element(ElementInfo::new("x", "Bad.Missing")));
        assert!(matches!(
            Model::from_model_info(&info, &Model::system()),
            Err(ModelError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_system_model() {
        let system = Model::system();
        assert!(system.is_system());
        assert_eq!(system.resolve_type_name("Any"), Some(&DataType::Any));
        assert_eq!(
            system.resolve_type_name("System.Quantity"),
            Some(&SystemType::Quantity.data_type())
        );
    }
}
