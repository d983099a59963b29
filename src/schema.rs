//! Input/output schema validation for enrichment definitions.
//!
//! Deliberately small: required-field presence plus primitive type checks on
//! JSON objects. Definitions that need richer validation do it inside their
//! worker, where the full raw input is in hand.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Primitive JSON types a schema field can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(&self, value: &JsonValue) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        };
        write!(f, "{name}")
    }
}

/// Field-level schema for enrichment inputs and outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Declared fields and their required JSON types.
    pub fields: HashMap<String, FieldType>,
    /// Fields that must be present.
    #[serde(default)]
    pub required: Vec<String>,
}

impl Schema {
    pub fn new(fields: HashMap<String, FieldType>, required: Vec<String>) -> Self {
        Self { fields, required }
    }

    /// Convenience constructor from `(name, type)` pairs, all required.
    pub fn of_required(fields: &[(&str, FieldType)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(name, ty)| ((*name).to_string(), *ty))
                .collect(),
            required: fields.iter().map(|(name, _)| (*name).to_string()).collect(),
        }
    }

    /// Validate a JSON document against this schema.
    ///
    /// The document must be an object; every required field must be present;
    /// every present field must be declared and match its declared type.
    pub fn validate(&self, data: &JsonValue) -> std::result::Result<(), String> {
        let object = data
            .as_object()
            .ok_or_else(|| format!("expected an object, got {}", json_type_name(data)))?;

        for required in &self.required {
            if !object.contains_key(required) {
                return Err(format!("missing required field '{required}'"));
            }
        }

        for (field, value) in object {
            match self.fields.get(field) {
                None => return Err(format!("unknown field '{field}'")),
                Some(expected) if !expected.matches(value) => {
                    return Err(format!(
                        "field '{field}' expected {expected}, got {}",
                        json_type_name(value)
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
