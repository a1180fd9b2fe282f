//! # Parametra
//!
//! A declarative request-parameter resolution engine for Rust web services.
//!
//! Parametra sits on top of axum and turns explicit route declarations into
//! validated, typed handler arguments: path, query, header, cookie, body and
//! form parameters, recursive dependency resolvers with per-request caching
//! and scoped teardown, and built-in security schemes.
//!
//! ## Features
//!
//! - **Declarative routes**: every handler input is declared with a marker,
//!   classified once at registration
//! - **Dependency resolvers**: reusable callables with their own declared
//!   inputs, flattened into one request-time plan with cycle detection
//! - **Aggregated validation**: all wire errors across every location are
//!   reported together in a single 422 response
//! - **Security schemes**: API keys, HTTP bearer and OAuth2 password flow,
//!   resolved before anything else touches the request
//! - **Scoped resources**: resolver teardowns run in reverse order when the
//!   request finishes, whatever the outcome
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parametra::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = App::new()
//!         .route(
//!             Route::get("/items/{item_id}")
//!                 .param("item_id", Param::auto(FieldType::Integer).ge(1.0))
//!                 .param(
//!                     "limit",
//!                     Param::query(FieldType::Integer).default_value(json!(10)),
//!                 )
//!                 .handle(handler_fn(|args: Args| async move {
//!                     let item_id: i64 = args.parse("item_id")?;
//!                     let limit: i64 = args.parse("limit")?;
//!                     Ok(HandlerOutput::json(json!({
//!                         "item_id": item_id,
//!                         "limit": limit,
//!                     })))
//!                 })),
//!         )
//!         .expect("route registration failed");
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//!     axum::serve(listener, app.into_router()).await.unwrap();
//! }
//! ```

pub mod app;
pub mod config;
pub mod dependency;
pub mod endpoint;
pub mod error;
pub mod exception;
pub mod invoke;
pub mod openapi;
pub mod param;
pub mod request;
pub mod resolve;
pub mod schema;
pub mod security;
pub mod worker;

// Re-export core types
pub use app::App;
pub use endpoint::{EndpointModel, Route};
pub use error::{ParametraError, Result};
pub use exception::HttpException;
pub use param::{AmbientKind, Param, ParamDecl};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use parametra::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::App;
    pub use crate::config::Settings;
    pub use crate::dependency::{
        Resolve, Resolved, ResolverOverrides, TeardownOutcome, resolver_fn,
    };
    pub use crate::endpoint::{EndpointModel, Route};
    pub use crate::error::{ParametraError, Result};
    pub use crate::exception::HttpException;
    pub use crate::invoke::{HandlerOutput, blocking_fn, handler_fn};
    pub use crate::param::{AmbientKind, Param, ParamDecl};
    pub use crate::request::{Args, BackgroundHandle, RequestData, ResponseHandle};
    pub use crate::schema::{Field, FieldType, Schema, Validator};
    pub use crate::security::{
        ApiKeyCookie, ApiKeyHeader, ApiKeyQuery, HttpBearer, OAuth2PasswordBearer,
    };
    pub use crate::worker::WorkerPool;
}
