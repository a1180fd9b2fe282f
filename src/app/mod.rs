//! Application assembly and the per-request pipeline.
//!
//! An [`App`] collects built endpoints and turns into an `axum::Router`.
//! Each request runs the same pipeline: build the transport view, resolve
//! the flattened parameter map, invoke the handler, close the scoped
//! resource stack and spawn any background tasks.

use crate::config::Settings;
use crate::dependency::{ResolverOverrides, TeardownOutcome};
use crate::endpoint::{EndpointModel, Route};
use crate::error::Result;
use crate::invoke::invoke;
use crate::openapi::{self, RouteInfo};
use crate::request::RequestData;
use crate::resolve::{ResolutionContext, resolve_params};
use crate::worker::WorkerPool;
use axum::Router;
use axum::extract::{RawPathParams, Request};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, on};
use std::sync::Arc;
use tracing::Instrument;

/// The application: registered endpoints plus the shared runtime pieces.
pub struct App {
    settings: Settings,
    endpoints: Vec<Arc<EndpointModel>>,
    worker: WorkerPool,
    overrides: Arc<ResolverOverrides>,
}

impl App {
    pub fn new() -> Self {
        Self::with_settings(Settings::from_env())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let worker = WorkerPool::new(settings.worker_threads);
        Self {
            settings,
            endpoints: Vec::new(),
            worker,
            overrides: Arc::new(ResolverOverrides::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The override registry; shared with every request.
    pub fn overrides(&self) -> Arc<ResolverOverrides> {
        Arc::clone(&self.overrides)
    }

    /// Build and register a route. Registration errors abort startup.
    pub fn route(mut self, route: Route) -> Result<Self> {
        let endpoint = Arc::new(route.build()?);
        tracing::debug!(path = %endpoint.path, methods = ?endpoint.methods, "route registered");
        self.endpoints.push(endpoint);
        Ok(self)
    }

    pub fn endpoints(&self) -> &[Arc<EndpointModel>] {
        &self.endpoints
    }

    /// Documentation surface for every visible endpoint.
    pub fn routes_info(&self) -> Vec<RouteInfo> {
        self.endpoints
            .iter()
            .filter_map(|endpoint| openapi::describe(endpoint))
            .collect()
    }

    pub fn into_router(self) -> Router {
        let mut router = Router::new();
        for endpoint in &self.endpoints {
            let Some(filter) = method_filter(&endpoint.methods) else {
                tracing::warn!(path = %endpoint.path, "no routable method; endpoint skipped");
                continue;
            };

            let endpoint = Arc::clone(endpoint);
            let worker = self.worker.clone();
            let overrides = Arc::clone(&self.overrides);
            let max_body_size = self.settings.max_body_size;
            let path = endpoint.path.clone();

            let handler = move |raw_params: RawPathParams, request: Request| {
                serve(
                    Arc::clone(&endpoint),
                    worker.clone(),
                    Arc::clone(&overrides),
                    max_body_size,
                    raw_params,
                    request,
                )
            };
            router = router.route(&path, on(filter, handler));
        }
        router
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn method_filter(methods: &[Method]) -> Option<MethodFilter> {
    let mut combined: Option<MethodFilter> = None;
    for method in methods {
        let Ok(filter) = MethodFilter::try_from(method.clone()) else {
            tracing::warn!(%method, "method not routable");
            continue;
        };
        combined = Some(match combined {
            Some(existing) => existing.or(filter),
            None => filter,
        });
    }
    combined
}

/// The per-request pipeline.
async fn serve(
    endpoint: Arc<EndpointModel>,
    worker: WorkerPool,
    overrides: Arc<ResolverOverrides>,
    max_body_size: usize,
    raw_params: RawPathParams,
    request: Request,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        id = %request_id,
        method = %request.method(),
        path = %endpoint.path,
    );

    async move {
        let (parts, body) = request.into_parts();
        let mut data = RequestData::new(parts.method, parts.uri.path());
        for (name, value) in raw_params.iter() {
            data.set_path_param(name, value);
        }
        if let Some(query) = parts.uri.query() {
            data.set_query_string(query);
        }
        if let Some(cookie) = parts.headers.get("cookie").and_then(|v| v.to_str().ok()) {
            data.set_cookies_from_header(cookie);
        }
        *data.headers_mut() = parts.headers;
        data.set_max_body_size(max_body_size);
        data.set_body(body);

        let mut ctx = ResolutionContext::new(Arc::new(data)).with_overrides(overrides);

        let response = match resolve_params(&endpoint.flat_params, &mut ctx).await {
            Ok(args) => match invoke(&endpoint, &args, &worker, &ctx.response).await {
                Ok(response) => {
                    ctx.scope.close(TeardownOutcome::Success).await;
                    response
                }
                Err(exc) => {
                    ctx.scope.close(TeardownOutcome::Failure).await;
                    exc.into_response()
                }
            },
            Err(failure) => {
                ctx.scope.close(TeardownOutcome::Failure).await;
                failure.into_response()
            }
        };

        // Deferred work runs after the response is settled; failures are
        // logged, never surfaced.
        for task in ctx.background.drain() {
            tokio::spawn(async move {
                if let Err(error) = task.await {
                    tracing::error!(%error, "background task failed");
                }
            });
        }

        tracing::info!(status = %response.status(), "request completed");
        response
    }
    .instrument(span)
    .await
}
