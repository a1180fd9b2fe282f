//! Documentation metadata derived from registered endpoints.
//!
//! This is a read-only projection of the flattened parameter maps, not a
//! full document generator: each endpoint becomes a [`RouteInfo`] carrying
//! the wire parameters, body and security schemes a client needs to know
//! about.

use crate::endpoint::EndpointModel;
use crate::param::ParamSpec;
use crate::schema::{Field, FieldType, Validator};
use crate::security::SecurityModel;
use serde_json::{Map, Value, json};

/// Wire location of a documented parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

/// One documented wire parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Value,
    pub title: Option<String>,
    pub deprecated: bool,
}

/// One documented endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    pub path: String,
    pub methods: Vec<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub status_code: u16,
    pub deprecated: bool,
    pub params: Vec<ParamInfo>,
    /// JSON schema of the request body, when body parameters are declared.
    pub body: Option<Value>,
    pub security: Vec<SecurityModel>,
    /// JSON schema of the response model, when one is declared.
    pub response: Option<Value>,
}

/// Describe an endpoint, or `None` when it is excluded from the surface.
pub fn describe(endpoint: &EndpointModel) -> Option<RouteInfo> {
    if !endpoint.include_in_schema {
        return None;
    }

    let mut params = Vec::new();
    let locations = [
        (ParamLocation::Path, &endpoint.flat_params.path),
        (ParamLocation::Query, &endpoint.flat_params.query),
        (ParamLocation::Header, &endpoint.flat_params.header),
        (ParamLocation::Cookie, &endpoint.flat_params.cookie),
    ];
    for (location, map) in locations {
        for (name, spec) in map {
            if let Some(info) = param_info(name, spec, location) {
                params.push(info);
            }
        }
    }

    let body = body_schema(endpoint);

    let security = endpoint
        .flat_params
        .security
        .values()
        .filter_map(|spec| spec.resolver.as_ref())
        .filter_map(|rs| rs.resolver.security_model())
        .collect();

    Some(RouteInfo {
        path: endpoint.path.clone(),
        methods: endpoint.methods.iter().map(|m| m.to_string()).collect(),
        summary: endpoint.summary.clone(),
        description: endpoint.description.clone(),
        tags: endpoint.tags.clone(),
        status_code: endpoint.status_code.as_u16(),
        deprecated: endpoint.deprecated,
        params,
        body,
        security,
        response: endpoint.response_model.as_ref().map(|model| {
            object_schema(model.fields().iter().map(|(n, f)| (n.as_str(), f)))
        }),
    })
}

fn param_info(name: &str, spec: &ParamSpec, location: ParamLocation) -> Option<ParamInfo> {
    if !spec.include_in_schema {
        return None;
    }
    let field = spec.field.as_ref()?;
    Some(ParamInfo {
        name: field.lookup_name(name),
        location,
        required: field.required,
        schema: field_schema(field),
        title: spec.title.clone(),
        deprecated: spec.deprecated,
    })
}

fn body_schema(endpoint: &EndpointModel) -> Option<Value> {
    let body = &endpoint.flat_params.body;
    if body.is_empty() {
        return None;
    }
    if body.len() == 1 {
        let spec = body.values().next()?;
        return spec.field.as_ref().map(field_schema);
    }
    // Several body parameters document as one object keyed by name.
    let fields = body.iter().filter_map(|(name, spec)| {
        spec.field.as_ref().map(|field| (name.as_str(), field))
    });
    Some(object_schema(fields))
}

fn object_schema<'a>(fields: impl Iterator<Item = (&'a str, &'a Field)>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, field) in fields {
        if field.required {
            required.push(json!(name));
        }
        properties.insert(name.to_string(), field_schema(field));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// JSON-schema rendering of one field: declared type plus validator bounds.
pub fn field_schema(field: &Field) -> Value {
    let mut schema = type_schema(&field.ty);
    if let Some(object) = schema.as_object_mut() {
        for rule in &field.validators {
            match rule {
                Validator::Ge(bound) => {
                    object.insert("minimum".into(), json!(bound));
                }
                Validator::Gt(bound) => {
                    object.insert("exclusiveMinimum".into(), json!(bound));
                }
                Validator::Le(bound) => {
                    object.insert("maximum".into(), json!(bound));
                }
                Validator::Lt(bound) => {
                    object.insert("exclusiveMaximum".into(), json!(bound));
                }
                Validator::MinLength(len) => {
                    object.insert("minLength".into(), json!(len));
                }
                Validator::MaxLength(len) => {
                    object.insert("maxLength".into(), json!(len));
                }
                Validator::Pattern(rule) => {
                    object.insert("pattern".into(), json!(rule.source()));
                }
            }
        }
        if let Some(default) = &field.default {
            if !default.is_null() {
                object.insert("default".into(), default.clone());
            }
        }
        if field.allow_none {
            object.insert("nullable".into(), json!(true));
        }
    }
    schema
}

fn type_schema(ty: &FieldType) -> Value {
    match ty {
        FieldType::String => json!({"type": "string"}),
        FieldType::Integer => json!({"type": "integer"}),
        FieldType::Number => json!({"type": "number"}),
        FieldType::Boolean => json!({"type": "boolean"}),
        FieldType::Uuid => json!({"type": "string", "format": "uuid"}),
        FieldType::DateTime => json!({"type": "string", "format": "date-time"}),
        FieldType::Array(inner) => json!({"type": "array", "items": type_schema(inner)}),
        FieldType::Object(schema) => {
            object_schema(schema.fields().iter().map(|(n, f)| (n.as_str(), f)))
        }
        FieldType::Optional(inner) => type_schema(inner),
        FieldType::Union(_) | FieldType::Any => json!({}),
    }
}
