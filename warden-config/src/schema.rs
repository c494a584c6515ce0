//! Plugin configuration schema and validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::record::ConfigMap;

/// Declares a plugin's configuration fields.
///
/// `sensitive_fields` drives the public/secret split: any incoming key named
/// here is encrypted at rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSchema {
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub sensitive_fields: Vec<String>,
}

/// Constraints on a single configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSchema {
    /// A field with only a type constraint.
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            pattern: None,
            min_length: None,
            max_length: None,
            allowed_values: None,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

/// JSON type a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One schema violation. Messages never echo the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

impl ConfigSchema {
    pub fn is_sensitive(&self, field: &str) -> bool {
        self.sensitive_fields.iter().any(|f| f == field)
    }

    /// Checks `config` against this schema.
    ///
    /// Fields without a declared property are accepted as-is. `null` on an
    /// optional field is treated as absent.
    pub fn validate(&self, config: &ConfigMap) -> ValidationReport {
        let mut errors = Vec::new();

        for field in &self.required {
            if is_empty(config.get(field)) {
                errors.push(ValidationError::new(field, "is required"));
            }
        }

        for (field, value) in config {
            if value.is_null() {
                continue;
            }
            if let Some(rule) = self.properties.get(field) {
                check_field(field, value, rule, &mut errors);
            }
        }

        ValidationReport::from_errors(errors)
    }
}

fn check_field(field: &str, value: &Value, rule: &FieldSchema, errors: &mut Vec<ValidationError>) {
    if !rule.field_type.matches(value) {
        errors.push(ValidationError::new(
            field,
            format!("expected {}", rule.field_type.as_str()),
        ));
        return;
    }

    if let Some(allowed) = &rule.allowed_values
        && !allowed.contains(value)
    {
        errors.push(ValidationError::new(field, "is not one of the allowed values"));
    }

    let Some(s) = value.as_str() else {
        return;
    };
    let len = s.chars().count();

    if let Some(min) = rule.min_length
        && len < min
    {
        errors.push(ValidationError::new(
            field,
            format!("must be at least {min} characters"),
        ));
    }
    if let Some(max) = rule.max_length
        && len > max
    {
        errors.push(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    if let Some(pattern) = &rule.pattern {
        match regex_lite::Regex::new(pattern) {
            Ok(re) if re.is_match(s) => {}
            Ok(_) => errors.push(ValidationError::new(
                field,
                format!("does not match pattern {pattern}"),
            )),
            Err(_) => errors.push(ValidationError::new(field, "schema pattern is invalid")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> ConfigMap {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn integer_rejects_fractional_numbers() {
        assert!(FieldType::Integer.matches(&json!(3)));
        assert!(!FieldType::Integer.matches(&json!(3.5)));
        assert!(FieldType::Number.matches(&json!(3.5)));
    }

    #[test]
    fn empty_string_counts_as_missing() {
        let schema = ConfigSchema {
            required: vec!["apiKey".into()],
            ..Default::default()
        };
        let report = schema.validate(&map(json!({"apiKey": ""})));
        assert!(!report.valid);
        assert_eq!(report.errors[0].field, "apiKey");
    }

    #[test]
    fn invalid_pattern_is_reported_not_panicked() {
        let mut schema = ConfigSchema::default();
        schema
            .properties
            .insert("x".into(), FieldSchema::string().with_pattern("("));
        let report = schema.validate(&map(json!({"x": "abc"})));
        assert_eq!(report.errors[0].message, "schema pattern is invalid");
    }
}
