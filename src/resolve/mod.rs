//! The request-time resolution engine.
//!
//! Given an endpoint's flattened parameter map and the request context,
//! resolution runs in three phases: security dependencies first, wire
//! parameters (with errors aggregated across every location), then the
//! remaining dependencies in declaration order. The output is the argument
//! map handlers and resolvers are called with.

use crate::dependency::{DependencyCache, RequestScope, ResolverOverrides, ResolverSpec};
use crate::exception::HttpException;
use crate::param::{AmbientKind, ParamKind, ParamMap};
use crate::request::{ArgValue, Args, BackgroundHandle, RequestData, ResponseHandle};
use crate::schema::RawValue;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

const BODY_PARSE_ERROR: &str = "There was an error parsing the body";

/// Aggregated validation failures, grouped by source kind then field name.
/// Declaration order is preserved in the serialized detail.
#[derive(Debug, Default)]
pub struct ErrorStore {
    errors: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl ErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ParamKind, field: impl Into<String>, messages: Vec<String>) {
        self.errors
            .entry(kind.to_string())
            .or_default()
            .entry(field.into())
            .or_default()
            .extend(messages);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.values().map(IndexMap::len).sum()
    }

    pub fn detail(&self) -> Value {
        json!(self.errors)
    }

    pub fn into_response(self) -> Response {
        let status = StatusCode::UNPROCESSABLE_ENTITY;
        (
            status,
            Json(json!({
                "detail": self.detail(),
                "error": "ValidationError",
                "status_code": status.as_u16(),
            })),
        )
            .into_response()
    }
}

/// Why resolution stopped: aggregated validation failures (422) or a single
/// aborting HTTP error.
#[derive(Debug)]
pub enum ResolutionFailure {
    Validation(ErrorStore),
    Http(HttpException),
}

impl From<HttpException> for ResolutionFailure {
    fn from(exc: HttpException) -> Self {
        Self::Http(exc)
    }
}

impl ResolutionFailure {
    pub fn into_response(self) -> Response {
        match self {
            Self::Validation(store) => store.into_response(),
            Self::Http(exc) => exc.into_response(),
        }
    }
}

/// Everything one request's resolution pass owns: the request itself, the
/// mutable ambient objects, the dependency cache, the scoped-resource stack
/// and the application's resolver overrides.
pub struct ResolutionContext {
    pub request: Arc<RequestData>,
    pub response: ResponseHandle,
    pub background: BackgroundHandle,
    pub cache: DependencyCache,
    pub scope: RequestScope,
    pub overrides: Option<Arc<ResolverOverrides>>,
}

impl ResolutionContext {
    pub fn new(request: Arc<RequestData>) -> Self {
        Self {
            request,
            response: ResponseHandle::new(),
            background: BackgroundHandle::new(),
            cache: DependencyCache::new(),
            scope: RequestScope::new(),
            overrides: None,
        }
    }

    pub fn with_overrides(mut self, overrides: Arc<ResolverOverrides>) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// Resolve a flattened parameter map against the request context.
///
/// Boxed because dependency resolution recurses back into this function for
/// each resolver's own parameter map.
pub fn resolve_params<'a>(
    params: &'a ParamMap,
    ctx: &'a mut ResolutionContext,
) -> Pin<Box<dyn Future<Output = Result<Args, ResolutionFailure>> + Send + 'a>> {
    Box::pin(async move {
        let mut args = Args::new();

        // Phase one: security dependencies, before any wire data is touched.
        // A failing scheme aborts immediately with its own status.
        for (name, spec) in &params.security {
            let Some(rs) = &spec.resolver else { continue };
            let value = resolve_dependency(rs, ctx).await?;
            args.insert(name.clone(), value);
        }

        // Phase two: wire locations, errors aggregated across all of them.
        let mut errors = ErrorStore::new();

        for (kind, map) in params.wire_maps() {
            for (name, spec) in map {
                let Some(field) = &spec.field else { continue };
                let lookup = field.lookup_name(name);
                let raw = match kind {
                    ParamKind::Path => ctx.request.path_param(&lookup),
                    ParamKind::Query => ctx.request.query(&lookup),
                    ParamKind::Header => ctx.request.header(&lookup),
                    ParamKind::Cookie => ctx.request.cookie(&lookup),
                    _ => unreachable!("wire_maps yields wire kinds only"),
                };
                let raw = raw.map_or(RawValue::Missing, RawValue::Text);
                match field.deserialize(raw) {
                    Ok(value) => args.insert(name.clone(), ArgValue::Json(value)),
                    Err(messages) => errors.push(kind, name.clone(), messages),
                }
            }
        }

        for (name, spec) in &params.ambient {
            let value = match spec.ambient {
                Some(AmbientKind::Request) => ArgValue::Request(Arc::clone(&ctx.request)),
                Some(AmbientKind::Response) => ArgValue::Response(ctx.response.clone()),
                Some(AmbientKind::BackgroundTasks) => ArgValue::Background(ctx.background.clone()),
                None => continue,
            };
            args.insert(name.clone(), value);
        }

        if !params.body.is_empty() {
            resolve_body(params, ctx, &mut args, &mut errors).await?;
        }
        if !params.form.is_empty() {
            resolve_form(params, ctx, &mut args, &mut errors).await?;
        }

        if !errors.is_empty() {
            return Err(ResolutionFailure::Validation(errors));
        }

        // Phase three: remaining dependencies, in declaration order. Names
        // already resolved (security dependencies) are skipped.
        for (name, spec) in &params.dependencies {
            if args.contains(name) {
                continue;
            }
            let Some(rs) = &spec.resolver else { continue };
            let value = resolve_dependency(rs, ctx).await?;
            args.insert(name.clone(), value);
        }

        Ok(args)
    })
}

/// A structurally unreadable body is a single 400, never a field error.
async fn resolve_body(
    params: &ParamMap,
    ctx: &mut ResolutionContext,
    args: &mut Args,
    errors: &mut ErrorStore,
) -> Result<(), ResolutionFailure> {
    let bytes = ctx.request.bytes().await?;
    let document: Option<Value> = if bytes.is_empty() {
        None
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(_) => return Err(HttpException::bad_request(BODY_PARSE_ERROR).into()),
        }
    };

    // A single body parameter consumes the whole document; with several,
    // each is keyed by name at the top level.
    let single = params.body.len() == 1;
    for (name, spec) in &params.body {
        let Some(field) = &spec.field else { continue };
        let raw = match &document {
            None => RawValue::Missing,
            Some(doc) if single => RawValue::Json(doc),
            Some(doc) => doc
                .get(&field.lookup_name(name))
                .map_or(RawValue::Missing, RawValue::Json),
        };
        match field.deserialize(raw) {
            Ok(value) => args.insert(name.clone(), ArgValue::Json(value)),
            Err(messages) => errors.push(ParamKind::Body, name.clone(), messages),
        }
    }
    Ok(())
}

async fn resolve_form(
    params: &ParamMap,
    ctx: &mut ResolutionContext,
    args: &mut Args,
    errors: &mut ErrorStore,
) -> Result<(), ResolutionFailure> {
    let bytes = ctx.request.bytes().await?;
    let items: Vec<(String, String)> = if bytes.is_empty() {
        Vec::new()
    } else {
        serde_urlencoded::from_bytes(&bytes)
            .map_err(|_| HttpException::bad_request(BODY_PARSE_ERROR))?
    };

    for (name, spec) in &params.form {
        let Some(field) = &spec.field else { continue };
        let lookup = field.lookup_name(name);
        // Last occurrence wins, matching query semantics.
        let raw = items
            .iter()
            .rev()
            .find(|(key, _)| *key == lookup)
            .map_or(RawValue::Missing, |(_, value)| RawValue::Text(value));
        match field.deserialize(raw) {
            Ok(value) => args.insert(name.clone(), ArgValue::Json(value)),
            Err(messages) => errors.push(ParamKind::Form, name.clone(), messages),
        }
    }
    Ok(())
}

/// Resolve one dependency: override lookup, cache check, recursive
/// resolution of its own parameters, then the resolver call.
async fn resolve_dependency(
    rs: &Arc<ResolverSpec>,
    ctx: &mut ResolutionContext,
) -> Result<ArgValue, ResolutionFailure> {
    let resolver = ctx
        .overrides
        .as_ref()
        .and_then(|overrides| overrides.lookup(&rs.resolver))
        .unwrap_or_else(|| Arc::clone(&rs.resolver));

    let key = rs.cache_key();
    if rs.use_cache {
        if let Some(value) = ctx.cache.get(&key) {
            return Ok(value);
        }
    }

    let sub_args = resolve_params(&rs.flat_params, ctx).await?;
    let call_args = sub_args.filter(&rs.params.root_names());
    let resolved = resolver.resolve(call_args).await?;

    if let Some(teardown) = resolved.teardown {
        ctx.scope.push(teardown);
    }
    if rs.use_cache {
        ctx.cache.insert(key, resolved.value.clone());
    }
    Ok(resolved.value)
}
