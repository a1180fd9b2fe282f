//! Handler invocation and response shaping.
//!
//! Once resolution produced the argument map, the handler is called with
//! exactly the arguments its own declaration names. Async handlers run
//! inline on the request task; blocking handlers are offloaded to the
//! worker pool. The returned value is shaped into the final response:
//! response-model filtering, ambient status/header overrides, and the
//! no-body status codes.

use crate::endpoint::EndpointModel;
use crate::exception::HttpException;
use crate::request::{Args, ResponseHandle};
use crate::worker::WorkerPool;
use async_trait::async_trait;
use axum::Json;
use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// What a handler produced.
pub enum HandlerOutput {
    /// A JSON value, subject to response-model filtering.
    Json(Value),
    /// A fully-built response, passed through untouched.
    Raw(Response),
}

impl HandlerOutput {
    pub fn json(value: impl Into<Value>) -> Self {
        Self::Json(value.into())
    }

    pub fn raw(response: impl IntoResponse) -> Self {
        Self::Raw(response.into_response())
    }
}

/// An async route handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, args: Args) -> Result<HandlerOutput, HttpException>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerOutput, HttpException>> + Send + 'static,
{
    async fn call(&self, args: Args) -> Result<HandlerOutput, HttpException> {
        (self.0)(args).await
    }
}

type BlockingFn = dyn Fn(Args) -> Result<HandlerOutput, HttpException> + Send + Sync;

/// The route's callable, tagged by execution model.
#[derive(Clone)]
pub enum RouteHandler {
    /// Awaited inline on the request task.
    Async(Arc<dyn Handler>),
    /// Offloaded to the worker pool.
    Blocking(Arc<BlockingFn>),
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Async(_) => write!(f, "RouteHandler::Async"),
            Self::Blocking(_) => write!(f, "RouteHandler::Blocking"),
        }
    }
}

/// Wrap an async closure as a route handler.
pub fn handler_fn<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutput, HttpException>> + Send + 'static,
{
    RouteHandler::Async(Arc::new(FnHandler(f)))
}

/// Wrap a synchronous closure as a route handler; it will run on the
/// worker pool.
pub fn blocking_fn<F>(f: F) -> RouteHandler
where
    F: Fn(Args) -> Result<HandlerOutput, HttpException> + Send + Sync + 'static,
{
    RouteHandler::Blocking(Arc::new(f))
}

fn status_forbids_body(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Call the endpoint's handler and shape the response.
pub async fn invoke(
    endpoint: &EndpointModel,
    args: &Args,
    worker: &WorkerPool,
    response: &ResponseHandle,
) -> Result<Response, HttpException> {
    let handler_args = args.filter(&endpoint.params.root_names());

    let output = match &endpoint.handler {
        RouteHandler::Async(handler) => handler.call(handler_args).await?,
        RouteHandler::Blocking(f) => {
            let f = Arc::clone(f);
            worker.run(move || f(handler_args)).await??
        }
    };

    let value = match output {
        HandlerOutput::Raw(response) => return Ok(response),
        HandlerOutput::Json(value) => match &endpoint.response_model {
            Some(model) => model.dump(&value).map_err(|reason| {
                tracing::error!(path = %endpoint.path, %reason, "response model violated");
                HttpException::internal("Internal Server Error")
            })?,
            None => value,
        },
    };

    let (ambient_status, ambient_headers) = response.snapshot();
    let status = ambient_status.unwrap_or(endpoint.status_code);

    let mut out = if status_forbids_body(status) {
        let mut out = Response::new(Body::empty());
        *out.status_mut() = status;
        out
    } else {
        let mut out = Json(value).into_response();
        *out.status_mut() = status;
        out
    };
    for (name, value) in ambient_headers.iter() {
        out.headers_mut().insert(name.clone(), value.clone());
    }
    Ok(out)
}
