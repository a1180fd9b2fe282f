//! Field types, composite schemas and validator rules.
//!
//! This is the validation backend the resolution engine feeds raw wire
//! values through. A [`Field`] handles one parameter; a [`Schema`] is a named
//! composite of fields used for body payloads and response models.

mod field;
pub mod validators;

pub use field::{Field, FieldType, RawValue};
pub use validators::{PatternRule, Validator};

use indexmap::IndexMap;
use serde_json::Value;

/// A named composite schema.
///
/// Used for nested-object body parameters and for response models. Loading
/// validates every declared field and reports all failures together; dumping
/// filters a value down to the declared fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    name: String,
    fields: IndexMap<String, Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    /// Validate a JSON object against the schema.
    ///
    /// Returns the canonical object, or per-field error messages keyed by
    /// field name.
    pub fn load(&self, value: &Value) -> Result<Value, IndexMap<String, Vec<String>>> {
        let mut errors: IndexMap<String, Vec<String>> = IndexMap::new();
        let Some(object) = value.as_object() else {
            errors.insert(self.name.clone(), vec!["Not a valid object.".to_string()]);
            return Err(errors);
        };

        let mut out = serde_json::Map::new();
        for (name, field) in &self.fields {
            let raw = match object.get(name) {
                Some(v) => RawValue::Json(v),
                None => RawValue::Missing,
            };
            match field.deserialize(raw) {
                Ok(v) => {
                    out.insert(name.clone(), v);
                }
                Err(msgs) => {
                    errors.insert(name.clone(), msgs);
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(out))
        } else {
            Err(errors)
        }
    }

    /// Serialize a value through the schema, keeping only declared fields.
    ///
    /// Missing non-required fields fall back to their default; a missing
    /// required field is a serialization error (the handler returned a value
    /// that does not satisfy its own response contract).
    pub fn dump(&self, value: &Value) -> Result<Value, String> {
        let Some(object) = value.as_object() else {
            return Err(format!("`{}` response is not an object", self.name));
        };

        let mut out = serde_json::Map::new();
        for (name, field) in &self.fields {
            match object.get(name) {
                Some(v) => {
                    out.insert(name.clone(), v.clone());
                }
                None if !field.required => {
                    if let Some(default) = &field.default {
                        out.insert(name.clone(), default.clone());
                    }
                }
                None => {
                    return Err(format!(
                        "response missing required field `{name}` of `{}`",
                        self.name
                    ));
                }
            }
        }
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> Schema {
        let mut age = Field::new(FieldType::Integer);
        age.required = false;
        age.default = Some(json!(0));
        Schema::new("User")
            .field("name", Field::new(FieldType::String))
            .field("age", age)
    }

    #[test]
    fn load_valid_object() {
        let schema = user_schema();
        let loaded = schema.load(&json!({"name": "ana", "age": 3})).unwrap();
        assert_eq!(loaded, json!({"name": "ana", "age": 3}));
    }

    #[test]
    fn load_applies_defaults() {
        let schema = user_schema();
        let loaded = schema.load(&json!({"name": "ana"})).unwrap();
        assert_eq!(loaded, json!({"name": "ana", "age": 0}));
    }

    #[test]
    fn load_collects_all_field_errors() {
        let schema = user_schema();
        let errors = schema.load(&json!({"age": "x"})).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors["name"], vec!["Missing data for required field."]);
        assert_eq!(errors["age"], vec!["Not a valid integer."]);
    }

    #[test]
    fn load_rejects_non_object() {
        let schema = user_schema();
        assert!(schema.load(&json!([1, 2])).is_err());
    }

    #[test]
    fn dump_filters_undeclared_fields() {
        let schema = user_schema();
        let dumped = schema
            .dump(&json!({"name": "ana", "age": 1, "secret": true}))
            .unwrap();
        assert_eq!(dumped, json!({"name": "ana", "age": 1}));
    }

    #[test]
    fn dump_missing_required_is_error() {
        let schema = user_schema();
        assert!(schema.dump(&json!({"age": 1})).is_err());
    }
}
