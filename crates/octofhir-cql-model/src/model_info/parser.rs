//! ModelInfo parser for the JSON format
//!
//! Parses ModelInfo documents into `ModelInfo` structures and element type
//! references such as `List<FHIR.HumanName>` into `TypeReference` trees.

use super::types::{ConversionInfo, ElementInfo, ModelInfo, TypeInfo};
use serde_json::Value as JsonValue;

/// Error type for ModelInfo parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid ModelInfo structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid type reference: {0}")]
    InvalidTypeReference(String),
}

/// Parse ModelInfo from JSON format
pub fn parse_json(json_content: &str) -> Result<ModelInfo, ParseError> {
    let json: JsonValue = serde_json::from_str(json_content)?;

    let name = json["name"]
        .as_str()
        .ok_or_else(|| ParseError::InvalidStructure("Missing model name".to_string()))?;
    let mut model_info = ModelInfo::new(
        name,
        json["version"].as_str(),
        json["url"].as_str().unwrap_or(""),
    );
    model_info.patient_class_name = json["patientClassName"].as_str().map(String::from);

    if let Some(type_infos) = json["typeInfo"].as_array() {
        for type_json in type_infos {
            model_info.type_infos.push(parse_type_info_json(type_json)?);
        }
    }

    if let Some(conversion_infos) = json["conversionInfo"].as_array() {
        for conversion_json in conversion_infos {
            model_info
                .conversion_infos
                .push(parse_conversion_info_json(conversion_json)?);
        }
    }

    Ok(model_info)
}

fn parse_type_info_json(json: &JsonValue) -> Result<TypeInfo, ParseError> {
    let mut type_info = TypeInfo::new(
        json["name"]
            .as_str()
            .ok_or_else(|| ParseError::InvalidStructure("Missing type name".to_string()))?,
    );

    type_info.base_type = json["baseType"].as_str().map(String::from);
    type_info.label = json["label"].as_str().map(String::from);
    type_info.retrievable = json["retrievable"].as_bool().unwrap_or(false);

    if let Some(elements) = json["element"].as_array() {
        for elem_json in elements {
            type_info.elements.push(parse_element_json(elem_json)?);
        }
    }

    Ok(type_info)
}

fn parse_element_json(json: &JsonValue) -> Result<ElementInfo, ParseError> {
    let name = json["name"]
        .as_str()
        .ok_or_else(|| ParseError::InvalidStructure("Missing element name".to_string()))?;

    let element_type = json["elementType"]
        .as_str()
        .or_else(|| json["type"].as_str())
        .ok_or_else(|| ParseError::InvalidStructure(format!("Missing type of element {}", name)))?;

    let mut element = ElementInfo::new(name, element_type);
    element.prohibited = json["prohibited"].as_bool().unwrap_or(false);
    Ok(element)
}

fn parse_conversion_info_json(json: &JsonValue) -> Result<ConversionInfo, ParseError> {
    let from_type = json["fromType"]
        .as_str()
        .ok_or_else(|| ParseError::InvalidStructure("Missing conversion fromType".to_string()))?;
    let to_type = json["toType"]
        .as_str()
        .ok_or_else(|| ParseError::InvalidStructure("Missing conversion toType".to_string()))?;

    let mut conversion = ConversionInfo::new(from_type, to_type, json["functionName"].as_str());
    conversion.implicit = json["implicit"].as_bool().unwrap_or(true);
    Ok(conversion)
}

/// Parsed element type reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeReference {
    /// Simple or qualified type name
    Named(String),
    /// `List<T>`
    List(Box<TypeReference>),
    /// `Interval<T>`
    Interval(Box<TypeReference>),
    /// `Choice<A,B,...>`
    Choice(Vec<TypeReference>),
}

/// Parse a type reference; container keywords are case-insensitive
pub fn parse_type_reference(text: &str) -> Result<TypeReference, ParseError> {
    let text = text.trim();
    let Some(open) = text.find('<') else {
        if text.is_empty() || text.contains('>') || text.contains(',') {
            return Err(ParseError::InvalidTypeReference(text.to_string()));
        }
        return Ok(TypeReference::Named(text.to_string()));
    };

    let inner = text[open + 1..]
        .strip_suffix('>')
        .ok_or_else(|| ParseError::InvalidTypeReference(text.to_string()))?;
    let keyword = text[..open].trim().to_ascii_lowercase();

    match keyword.as_str() {
        "list" => Ok(TypeReference::List(Box::new(parse_type_reference(inner)?))),
        "interval" => Ok(TypeReference::Interval(Box::new(parse_type_reference(inner)?))),
        "choice" => {
            let alternatives = split_top_level(inner)
                .into_iter()
                .map(parse_type_reference)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TypeReference::Choice(alternatives))
        }
        _ => Err(ParseError::InvalidTypeReference(text.to_string())),
    }
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_json() {
        let json = r#"{
            "name": "Test",
            "version": "1.0.0",
            "url": "http://test.org/model",
            "typeInfo": [
                {
                    "name": "Patient",
                    "baseType": "Test.Resource",
                    "label": "Person",
                    "retrievable": true,
                    "element": [
                        {"name": "id", "elementType": "System.String"},
                        {"name": "secret", "type": "System.String", "prohibited": true}
                    ]
                },
                {"name": "Resource"}
            ],
            "conversionInfo": [
                {"fromType": "Test.Code", "toType": "System.Code", "functionName": "TestHelpers.ToCode"}
            ]
        }"#;

        let info = parse_json(json).unwrap();
        assert_eq!(info.name, "Test");
        assert_eq!(info.version.as_deref(), Some("1.0.0"));
        assert_eq!(info.type_infos.len(), 2);

        let patient = info.get_type("Test.Patient").unwrap();
        assert_eq!(patient.label.as_deref(), Some("Person"));
        assert!(patient.retrievable);
        assert!(patient.get_element("secret").unwrap().prohibited);

        let conversion = &info.conversion_infos[0];
        assert_eq!(conversion.function_name.as_deref(), Some("TestHelpers.ToCode"));
        assert!(conversion.implicit);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        assert!(matches!(
            parse_json(r#"{"typeInfo": []}"#),
            Err(ParseError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_parse_type_references() {
        assert_eq!(
            parse_type_reference("list<FHIR.HumanName>").unwrap(),
            TypeReference::List(Box::new(TypeReference::Named("FHIR.HumanName".into())))
        );
        assert_eq!(
            parse_type_reference("Choice<System.Integer, List<System.String>>").unwrap(),
            TypeReference::Choice(vec![
                TypeReference::Named("System.Integer".into()),
                TypeReference::List(Box::new(TypeReference::Named("System.String".into()))),
            ])
        );
        assert!(parse_type_reference("Map<A>").is_err());
        assert!(parse_type_reference("List<A").is_err());
    }
}
