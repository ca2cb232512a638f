//! The subset of JSON Schema used to describe transaction parameters and
//! return values: `type`, `enum`, `properties`, `required`,
//! `additionalProperties`, `items`, numeric and length bounds, and `$ref`s
//! into `#/components/schemas`.

use serde_json::{Map, Value};

use crate::{Error, Result};

const COMPONENT_REF_PREFIX: &str = "#/components/schemas/";

pub struct SchemaValidator<'a> {
    components: &'a Map<String, Value>,
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn invalid(path: &str, message: String) -> Error {
    Error::SchemaValidation(format!("{}: {}", path, message))
}

impl<'a> SchemaValidator<'a> {
    pub fn new(components: &'a Map<String, Value>) -> Self {
        SchemaValidator { components }
    }

    pub fn validate(&self, value: &Value, schema: &Value, path: &str) -> Result<()> {
        let schema = match schema.as_object() {
            Some(schema) => schema,
            // `true`, `{}` and anything unrecognised accept every value
            None => return Ok(()),
        };

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            let target = reference
                .strip_prefix(COMPONENT_REF_PREFIX)
                .and_then(|name| self.components.get(name))
                .ok_or_else(|| invalid(path, format!("unresolved schema reference {}", reference)))?;
            return self.validate(value, target, path);
        }

        match schema.get("type") {
            Some(Value::String(expected)) => {
                if !type_matches(value, expected) {
                    return Err(invalid(
                        path,
                        format!("expected {} but got {}", expected, type_name(value)),
                    ));
                }
            }
            Some(Value::Array(expected)) => {
                let matched = expected
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|expected| type_matches(value, expected));
                if !matched {
                    return Err(invalid(
                        path,
                        format!("{} is not one of the allowed types", type_name(value)),
                    ));
                }
            }
            _ => {}
        }

        if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(invalid(path, format!("{} is not an allowed value", value)));
            }
        }

        match value {
            Value::String(text) => self.validate_length(text, schema, path)?,
            Value::Number(number) => {
                if let Some(number) = number.as_f64() {
                    self.validate_range(number, schema, path)?;
                }
            }
            Value::Array(elements) => {
                if let Some(items) = schema.get("items") {
                    for (index, element) in elements.iter().enumerate() {
                        self.validate(element, items, &format!("{}[{}]", path, index))?;
                    }
                }
            }
            Value::Object(fields) => self.validate_object(fields, schema, path)?,
            _ => {}
        }
        Ok(())
    }

    /// Turns one raw argument into the value validated against `schema`.
    /// String parameters take the text as-is, so ids such as `1001` stay
    /// strings; a quoted JSON string literal is still unquoted.
    pub fn decode_argument(&self, raw: &str, schema: &Value) -> Value {
        if self.declared_type(schema) == Some("string") {
            if raw.starts_with('"') {
                if let Ok(text) = serde_json::from_str::<String>(raw) {
                    return Value::String(text);
                }
            }
            return Value::String(raw.to_string());
        }
        parse_argument(raw)
    }

    fn declared_type<'s>(&'s self, mut schema: &'s Value) -> Option<&'s str> {
        // bounded so a self-referencing component cannot loop forever
        for _ in 0..=self.components.len() {
            match schema.get("$ref").and_then(Value::as_str) {
                Some(reference) => {
                    schema = reference
                        .strip_prefix(COMPONENT_REF_PREFIX)
                        .and_then(|name| self.components.get(name))?;
                }
                None => return schema.get("type").and_then(Value::as_str),
            }
        }
        None
    }

    fn validate_length(&self, text: &str, schema: &Map<String, Value>, path: &str) -> Result<()> {
        let length = text.chars().count() as u64;
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if length < min {
                return Err(invalid(path, format!("shorter than {} characters", min)));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if length > max {
                return Err(invalid(path, format!("longer than {} characters", max)));
            }
        }
        Ok(())
    }

    fn validate_range(&self, number: f64, schema: &Map<String, Value>, path: &str) -> Result<()> {
        if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
            if number < minimum {
                return Err(invalid(path, format!("{} is less than {}", number, minimum)));
            }
        }
        if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
            if number > maximum {
                return Err(invalid(path, format!("{} is greater than {}", number, maximum)));
            }
        }
        Ok(())
    }

    fn validate_object(
        &self,
        fields: &Map<String, Value>,
        schema: &Map<String, Value>,
        path: &str,
    ) -> Result<()> {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(name) {
                    return Err(invalid(path, format!("missing required property {}", name)));
                }
            }
        }
        let properties = schema.get("properties").and_then(Value::as_object);
        for (name, field) in fields {
            let field_path = format!("{}.{}", path, name);
            match properties.and_then(|properties| properties.get(name)) {
                Some(property_schema) => self.validate(field, property_schema, &field_path)?,
                None => {
                    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                        return Err(invalid(path, format!("unexpected property {}", name)));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Turns one string argument into a JSON value: valid JSON is taken as is,
/// anything else is a plain string.
pub fn parse_argument(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Bytes sent back to the client: strings raw, everything else as JSON.
pub fn encode_return(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Null => Ok(vec![]),
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        other => Ok(serde_json::to_vec(other)?),
    }
}
