// crates/opensearch-mcp/src/validation.rs
// ============================================================================
// Module: Argument Validation
// Description: Compiled JSON Schema validators for tool arguments.
// Purpose: Reject malformed arguments before any cluster call, naming the field.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Each tool's input schema is compiled once into an [`ArgumentValidator`].
//! Validation checks required properties, unknown properties when the schema
//! closes them, and each property against its own sub-schema so failures can
//! name the offending field. The whole schema is then applied for any
//! remaining cross-property constraints.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Argument validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentError {
    /// Offending argument, when one can be named.
    pub field: Option<String>,
    /// Failure detail.
    pub message: String,
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "argument {field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ArgumentError {}

impl ArgumentError {
    /// Builds a field-scoped failure.
    fn field(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Compiled validator for one tool's arguments.
pub struct ArgumentValidator {
    /// Whole-schema validator.
    schema: Validator,
    /// Per-property validators keyed by property name.
    properties: BTreeMap<String, Validator>,
    /// Required property names.
    required: Vec<String>,
    /// Whether properties outside `properties` are rejected.
    closed: bool,
}

impl fmt::Debug for ArgumentValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentValidator")
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("required", &self.required)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

impl ArgumentValidator {
    /// Compiles a tool input schema.
    ///
    /// # Errors
    ///
    /// Returns the compiler message when the schema is not a valid
    /// draft 2020-12 object schema.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        if !schema.is_object() {
            return Err("input schema must be a JSON object".to_string());
        }
        let compiled = compile_schema(schema)?;
        let mut properties = BTreeMap::new();
        if let Some(declared) = schema.get("properties").and_then(Value::as_object) {
            for (name, sub_schema) in declared {
                // Sub-schemas with unresolved references are covered by the whole-schema pass.
                if let Ok(validator) = compile_schema(sub_schema) {
                    properties.insert(name.clone(), validator);
                }
            }
        }
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).map(ToString::to_string).collect())
            .unwrap_or_default();
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        Ok(Self {
            schema: compiled,
            properties,
            required,
            closed,
        })
    }

    /// Validates call arguments. `null` is treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError`] describing the first failure found.
    pub fn validate(&self, arguments: &Value) -> Result<(), ArgumentError> {
        let empty = Value::Object(Map::new());
        let arguments = if arguments.is_null() { &empty } else { arguments };
        let Some(object) = arguments.as_object() else {
            return Err(ArgumentError {
                field: None,
                message: "arguments must be a JSON object".to_string(),
            });
        };
        for name in &self.required {
            if !object.contains_key(name) {
                return Err(ArgumentError::field(name, "is required"));
            }
        }
        for (name, value) in object {
            match self.properties.get(name) {
                Some(validator) => {
                    if let Some(err) = validator.iter_errors(value).next() {
                        return Err(ArgumentError::field(name, err.to_string()));
                    }
                }
                None if self.closed => {
                    return Err(ArgumentError::field(name, "is not an accepted argument"));
                }
                None => {}
            }
        }
        if let Some(err) = self.schema.iter_errors(arguments).next() {
            return Err(ArgumentError {
                field: None,
                message: err.to_string(),
            });
        }
        Ok(())
    }
}

/// Compiles a schema under draft 2020-12.
fn compile_schema(schema: &Value) -> Result<Validator, String> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
