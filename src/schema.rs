//! Payload schema validation
//!
//! A schema is a fixed, ordered set of required field names with expected
//! primitive types. Validation is a pure function: it walks the schema in
//! declaration order and collects every violation, so the error names all
//! offending fields rather than just the first.

use crate::core::Payload;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Expected primitive type of a required payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Number => f.write_str("number"),
        }
    }
}

/// A required field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
}

/// An immutable required-field schema. One instance per handler, fixed for
/// the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<(&str, FieldType)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, ty)| Field {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
        }
    }

    /// The canonical VM instance schema the notification handler validates
    /// payloads against.
    pub fn instance_fields() -> Self {
        Self::new(vec![
            ("instanceID", FieldType::String),
            ("instanceName", FieldType::String),
            ("ram", FieldType::Number),
            ("cpu", FieldType::Number),
            ("flavor", FieldType::String),
        ])
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// A field whose value type differs from the schema declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub field: String,
    pub expected: FieldType,
    pub found: &'static str,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (expected {}, found {})",
            self.field, self.expected, self.found
        )
    }
}

/// Payload failed schema validation. Enumerates every violation found.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", describe(.missing_fields, .type_mismatches))]
pub struct ValidationError {
    pub missing_fields: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
}

fn describe(missing: &[String], mismatches: &[TypeMismatch]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required fields: {}", missing.join(", ")));
    }
    if !mismatches.is_empty() {
        let listed: Vec<String> = mismatches.iter().map(|m| m.to_string()).collect();
        parts.push(format!("type mismatches: {}", listed.join(", ")));
    }
    parts.join("; ")
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validates a payload against a schema.
///
/// Succeeds iff every required field is present with a value of the declared
/// type. Fields not named by the schema are ignored. Pure, no side effects.
pub fn validate(payload: &Payload, schema: &Schema) -> Result<(), ValidationError> {
    let mut missing_fields = Vec::new();
    let mut type_mismatches = Vec::new();

    for field in schema.fields() {
        match payload.get(&field.name) {
            None => missing_fields.push(field.name.clone()),
            Some(value) if !field.ty.matches(value) => type_mismatches.push(TypeMismatch {
                field: field.name.clone(),
                expected: field.ty,
                found: json_type_name(value),
            }),
            Some(_) => {}
        }
    }

    if missing_fields.is_empty() && type_mismatches.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            missing_fields,
            type_mismatches,
        })
    }
}
