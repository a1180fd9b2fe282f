//! Route declaration and the registered endpoint model.
//!
//! A [`Route`] is the builder the application author writes: path, methods,
//! declared parameters, handler and documentation metadata. [`Route::build`]
//! runs the classifier and the dependency flattener once, producing an
//! immutable [`EndpointModel`] the request pipeline reads from.

use crate::dependency::Resolve;
use crate::dependency::flatten::flatten;
use crate::error::{ParametraError, Result};
use crate::invoke::{HandlerOutput, RouteHandler, blocking_fn};
use crate::param::{AmbientKind, Param, ParamDecl, ParamMap, classify};
use crate::schema::Schema;
use axum::http::{Method, StatusCode};
use std::sync::Arc;

/// Builder for one route.
pub struct Route {
    path: String,
    methods: Vec<Method>,
    decls: Vec<ParamDecl>,
    handler: Option<RouteHandler>,
    status_code: StatusCode,
    response_model: Option<Schema>,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    deprecated: bool,
    include_in_schema: bool,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: vec![method],
            decls: Vec::new(),
            handler: None,
            status_code: StatusCode::OK,
            response_model: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            deprecated: false,
            include_in_schema: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Serve the same declaration under an additional method.
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    pub fn param(mut self, name: impl Into<String>, param: Param) -> Self {
        self.decls.push(ParamDecl::field(name, param));
        self
    }

    pub fn depends(mut self, name: impl Into<String>, resolver: Arc<dyn Resolve>) -> Self {
        self.decls.push(ParamDecl::depends(name, resolver));
        self
    }

    pub fn depends_no_cache(mut self, name: impl Into<String>, resolver: Arc<dyn Resolve>) -> Self {
        self.decls.push(ParamDecl::depends_no_cache(name, resolver));
        self
    }

    pub fn security(mut self, name: impl Into<String>, scheme: Arc<dyn Resolve>) -> Self {
        self.decls.push(ParamDecl::security(name, scheme));
        self
    }

    pub fn security_scopes(
        mut self,
        name: impl Into<String>,
        scheme: Arc<dyn Resolve>,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.decls.push(ParamDecl::security_scopes(name, scheme, scopes));
        self
    }

    pub fn ambient(mut self, name: impl Into<String>, kind: AmbientKind) -> Self {
        self.decls.push(ParamDecl::ambient(name, kind));
        self
    }

    pub fn external(mut self, name: impl Into<String>) -> Self {
        self.decls.push(ParamDecl::external(name));
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status_code = status;
        self
    }

    pub fn response_model(mut self, model: Schema) -> Self {
        self.response_model = Some(model);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Exclude the route from the documentation surface.
    pub fn hidden(mut self) -> Self {
        self.include_in_schema = false;
        self
    }

    pub fn handle(mut self, handler: RouteHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach a synchronous handler; it will run on the worker pool.
    pub fn handle_blocking<F>(self, f: F) -> Self
    where
        F: Fn(crate::request::Args) -> std::result::Result<HandlerOutput, crate::exception::HttpException>
            + Send
            + Sync
            + 'static,
    {
        self.handle(blocking_fn(f))
    }

    /// Classify and flatten the declaration into an immutable endpoint.
    pub fn build(self) -> Result<EndpointModel> {
        let handler = self.handler.ok_or_else(|| ParametraError::MissingHandler {
            path: self.path.clone(),
        })?;
        if self.methods.is_empty() {
            return Err(ParametraError::MissingMethod { path: self.path });
        }

        let params = classify(&self.decls, &self.path)?;
        let flat_params = flatten(&params)?;

        Ok(EndpointModel {
            path: self.path,
            methods: self.methods,
            params,
            flat_params,
            handler,
            status_code: self.status_code,
            response_model: self.response_model,
            summary: self.summary,
            description: self.description,
            tags: self.tags,
            deprecated: self.deprecated,
            include_in_schema: self.include_in_schema,
        })
    }
}

/// One registered endpoint. Immutable after [`Route::build`].
#[derive(Debug)]
pub struct EndpointModel {
    pub path: String,
    pub methods: Vec<Method>,
    /// Direct classification of the route's own declaration; the handler
    /// receives exactly these names.
    pub params: ParamMap,
    /// Fully flattened map driving request-time resolution.
    pub flat_params: ParamMap,
    pub handler: RouteHandler,
    pub status_code: StatusCode,
    pub response_model: Option<Schema>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
    pub include_in_schema: bool,
}
