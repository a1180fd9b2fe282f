//! The signature classifier.
//!
//! Turns a route's (or a dependency resolver's) declared parameters plus the
//! route's path template into per-source-kind descriptor maps. Runs once at
//! registration; everything it produces is immutable afterwards.

use super::{Param, ParamDecl, ParamKind, ParamMap, ParamSpec, build_validators};
use crate::dependency::flatten::build_resolver_spec;
use crate::error::{ParametraError, Result};
use crate::schema::{Field, FieldType};
use serde_json::Value;
use std::collections::HashSet;

/// Classify a route's declared parameters against its path template.
pub fn classify(decls: &[ParamDecl], path: &str) -> Result<ParamMap> {
    let mut stack = Vec::new();
    classify_with_stack(decls, path, &mut stack)
}

/// Classification with the resolver stack threaded through, so nested
/// dependency graphs are classified against the same path template and
/// cycles fail fast at registration.
pub(crate) fn classify_with_stack(
    decls: &[ParamDecl],
    path: &str,
    stack: &mut Vec<(usize, String)>,
) -> Result<ParamMap> {
    let placeholders = path_placeholders(path);
    let mut map = ParamMap::default();
    let mut seen: HashSet<String> = HashSet::new();

    for decl in decls {
        if !seen.insert(decl.name().to_string()) {
            return Err(ParametraError::DuplicateDeclaration {
                name: decl.name().to_string(),
                path: path.to_string(),
            });
        }

        match decl {
            // Supplied outside the engine; produces no descriptor.
            ParamDecl::External { .. } => {}

            ParamDecl::Ambient { name, kind } => {
                map.insert(ParamSpec {
                    name: name.clone(),
                    kind: ParamKind::NoParam,
                    field: None,
                    ambient: Some(*kind),
                    resolver: None,
                    title: None,
                    deprecated: false,
                    include_in_schema: false,
                });
            }

            ParamDecl::Depends {
                name,
                resolver,
                use_cache,
            } => {
                let spec = build_resolver_spec(resolver, Vec::new(), *use_cache, path, stack)?;
                // A resolver exposing a security-scheme capability runs in
                // the security phase even when declared as a plain
                // dependency.
                let kind = if resolver.security_model().is_some() {
                    ParamKind::Security
                } else {
                    ParamKind::Dependency
                };
                map.insert(ParamSpec {
                    name: name.clone(),
                    kind,
                    field: None,
                    ambient: None,
                    resolver: Some(spec),
                    title: None,
                    deprecated: false,
                    include_in_schema: false,
                });
            }

            ParamDecl::Security {
                name,
                scheme,
                scopes,
                use_cache,
            } => {
                let spec = build_resolver_spec(scheme, scopes.clone(), *use_cache, path, stack)?;
                map.insert(ParamSpec {
                    name: name.clone(),
                    kind: ParamKind::Security,
                    field: None,
                    ambient: None,
                    resolver: Some(spec),
                    title: None,
                    deprecated: false,
                    include_in_schema: false,
                });
            }

            ParamDecl::Field { name, param } => {
                let kind = infer_kind(name, param, &placeholders);
                if kind == ParamKind::Path && !placeholders.contains(name) {
                    return Err(ParametraError::UnknownPathParam {
                        name: name.clone(),
                        path: path.to_string(),
                    });
                }
                let field = build_field(name, param, kind)?;
                map.insert(ParamSpec {
                    name: name.clone(),
                    kind,
                    field: Some(field),
                    ambient: None,
                    resolver: None,
                    title: param.title.clone(),
                    deprecated: param.deprecated,
                    include_in_schema: param.include_in_schema,
                });
            }
        }
    }

    Ok(map)
}

/// Marker kind if explicit, else `path` when the name matches a placeholder,
/// else `query`. There is no automatic fall-through to `body`.
fn infer_kind(name: &str, param: &Param, placeholders: &HashSet<String>) -> ParamKind {
    match param.kind {
        Some(kind) => kind,
        None if placeholders.contains(name) => ParamKind::Path,
        None => ParamKind::Query,
    }
}

fn build_field(name: &str, param: &Param, kind: ParamKind) -> Result<Field> {
    // Narrow an optional type to its single non-null alternative.
    let (ty, optional) = match &param.ty {
        FieldType::Optional(inner) => ((**inner).clone(), true),
        other => (other.clone(), false),
    };
    if matches!(ty, FieldType::Union(_)) {
        return Err(ParametraError::UnresolvableField {
            name: name.to_string(),
            ty: param.ty.describe(),
        });
    }

    let mut field = Field::new(ty);
    field.validators = build_validators(name, param)?;
    field.alias = param.alias.clone();
    field.convert_underscores = param
        .convert_underscores
        .unwrap_or(kind == ParamKind::Header);

    if optional {
        field.required = false;
        field.allow_none = true;
        field.default = Some(param.default.clone().unwrap_or(Value::Null));
    }
    if let Some(default) = &param.default {
        field.required = false;
        field.default = Some(default.clone());
    }

    Ok(field)
}

fn path_placeholders(path: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        names.insert(rest[start + 1..start + end].to_string());
        rest = &rest[start + end + 1..];
    }
    names
}
