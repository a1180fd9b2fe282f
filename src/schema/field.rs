use super::Schema;
use super::validators::Validator;
use serde_json::{Value, json};

/// The declared type of a single parameter.
///
/// `Optional` is only legal as the outermost wrapper; the classifier narrows
/// it away before a [`Field`] is built. `Union` exists to represent
/// declarations that cannot be resolved to one field type; building a field
/// from it is a registration-time failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Uuid,
    DateTime,
    Array(Box<FieldType>),
    Object(Schema),
    Optional(Box<FieldType>),
    Union(Vec<FieldType>),
    Any,
}

impl FieldType {
    /// Human-readable name used in registration error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::String => "string".into(),
            Self::Integer => "integer".into(),
            Self::Number => "number".into(),
            Self::Boolean => "boolean".into(),
            Self::Uuid => "uuid".into(),
            Self::DateTime => "datetime".into(),
            Self::Array(inner) => format!("array[{}]", inner.describe()),
            Self::Object(schema) => format!("object[{}]", schema.name()),
            Self::Optional(inner) => format!("optional[{}]", inner.describe()),
            Self::Union(alts) => {
                let names: Vec<String> = alts.iter().map(FieldType::describe).collect();
                format!("union[{}]", names.join(", "))
            }
            Self::Any => "any".into(),
        }
    }
}

/// Raw wire value handed to a field for deserialization.
#[derive(Debug, Clone, Copy)]
pub enum RawValue<'a> {
    /// The location had no entry for the field's lookup name.
    Missing,
    /// Textual value from path, query, header, cookie or form data.
    Text(&'a str),
    /// Structured value from a parsed JSON body.
    Json(&'a Value),
}

/// Validator/deserializer for one parameter.
///
/// Built once at registration; at request time [`Field::deserialize`] turns a
/// raw wire value into a canonical JSON value or a list of error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub ty: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub allow_none: bool,
    pub alias: Option<String>,
    pub convert_underscores: bool,
    pub validators: Vec<Validator>,
}

impl Field {
    pub fn new(ty: FieldType) -> Self {
        Self {
            ty,
            required: true,
            default: None,
            allow_none: false,
            alias: None,
            convert_underscores: false,
            validators: Vec::new(),
        }
    }

    /// The name used to look the field up in its wire location.
    pub fn lookup_name(&self, name: &str) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if self.convert_underscores {
            return name.replace('_', "-");
        }
        name.to_string()
    }

    /// Deserialize and validate a raw value.
    ///
    /// All failing validator messages are reported together.
    pub fn deserialize(&self, raw: RawValue<'_>) -> Result<Value, Vec<String>> {
        let value = match raw {
            RawValue::Missing => {
                if self.required {
                    return Err(vec!["Missing data for required field.".to_string()]);
                }
                return Ok(self.default.clone().unwrap_or(Value::Null));
            }
            RawValue::Text(text) => coerce_text(&self.ty, text).map_err(|msg| vec![msg])?,
            RawValue::Json(value) => {
                if value.is_null() {
                    if self.allow_none {
                        return Ok(Value::Null);
                    }
                    return Err(vec!["Field may not be null.".to_string()]);
                }
                coerce_json(&self.ty, value)?
            }
        };

        let messages: Vec<String> = self
            .validators
            .iter()
            .filter_map(|rule| rule.check(&value))
            .collect();
        if messages.is_empty() {
            Ok(value)
        } else {
            Err(messages)
        }
    }
}

fn coerce_text(ty: &FieldType, text: &str) -> Result<Value, String> {
    match ty {
        FieldType::String | FieldType::Any => Ok(json!(text)),
        FieldType::Integer => text
            .parse::<i64>()
            .map(|n| json!(n))
            .map_err(|_| "Not a valid integer.".to_string()),
        FieldType::Number => text
            .parse::<f64>()
            .map(|n| json!(n))
            .map_err(|_| "Not a valid number.".to_string()),
        FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(json!(true)),
            "false" | "0" | "off" | "no" => Ok(json!(false)),
            _ => Err("Not a valid boolean.".to_string()),
        },
        FieldType::Uuid => uuid::Uuid::parse_str(text)
            .map(|u| json!(u.to_string()))
            .map_err(|_| "Not a valid UUID.".to_string()),
        FieldType::DateTime => chrono::DateTime::parse_from_rfc3339(text)
            .map(|dt| json!(dt.to_rfc3339()))
            .map_err(|_| "Not a valid datetime.".to_string()),
        FieldType::Array(_) | FieldType::Object(_) => Err("Not a valid object.".to_string()),
        FieldType::Optional(inner) => coerce_text(inner, text),
        FieldType::Union(_) => Err("Not a valid value.".to_string()),
    }
}

fn coerce_json(ty: &FieldType, value: &Value) -> Result<Value, Vec<String>> {
    let single = |msg: &str| vec![msg.to_string()];
    match ty {
        FieldType::Any => Ok(value.clone()),
        FieldType::String => value
            .as_str()
            .map(|s| json!(s))
            .ok_or_else(|| single("Not a valid string.")),
        FieldType::Integer => value
            .as_i64()
            .map(|n| json!(n))
            .ok_or_else(|| single("Not a valid integer.")),
        FieldType::Number => value
            .as_f64()
            .map(|n| json!(n))
            .ok_or_else(|| single("Not a valid number.")),
        FieldType::Boolean => value
            .as_bool()
            .map(|b| json!(b))
            .ok_or_else(|| single("Not a valid boolean.")),
        FieldType::Uuid => value
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(|u| json!(u.to_string()))
            .ok_or_else(|| single("Not a valid UUID.")),
        FieldType::DateTime => value
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| json!(dt.to_rfc3339()))
            .ok_or_else(|| single("Not a valid datetime.")),
        FieldType::Array(inner) => {
            let items = value.as_array().ok_or_else(|| single("Not a valid list."))?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(coerce_json(inner, item)?);
            }
            Ok(Value::Array(out))
        }
        FieldType::Object(schema) => schema.load(value).map_err(|errors| {
            errors
                .into_iter()
                .flat_map(|(field, msgs)| msgs.into_iter().map(move |m| format!("{field}: {m}")))
                .collect()
        }),
        FieldType::Optional(inner) => coerce_json(inner, value),
        FieldType::Union(_) => Err(single("Not a valid value.")),
    }
}
