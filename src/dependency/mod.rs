//! Dependency resolution support.
//!
//! A [`Resolve`] implementation is any callable that produces a value for
//! one declared parameter at request time, possibly needing inputs resolved
//! the same way. Its inputs are classified once at registration into a
//! [`ResolverSpec`]; at request time resolution goes override → cache →
//! sub-parameters → invoke, with optional teardown registered on the
//! request's [`RequestScope`].

pub mod cache;
pub mod flatten;
pub mod overrides;
pub mod scope;

pub use cache::DependencyCache;
pub use overrides::ResolverOverrides;
pub use scope::{RequestScope, TeardownOutcome};

use crate::exception::HttpException;
use crate::param::{ParamDecl, ParamMap};
use crate::request::{ArgValue, Args};
use crate::security::SecurityModel;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Teardown registered by a resolver that acquired a scoped resource.
/// Runs exactly once when the request's resource stack unwinds.
pub type Teardown =
    Box<dyn FnOnce(TeardownOutcome) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A resolver's output: the resolved value plus an optional teardown.
pub struct Resolved {
    pub value: ArgValue,
    pub teardown: Option<Teardown>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("value", &self.value)
            .field("teardown", &self.teardown.as_ref().map(|_| "<teardown>"))
            .finish()
    }
}

impl Resolved {
    pub fn value(value: ArgValue) -> Self {
        Self {
            value,
            teardown: None,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::value(ArgValue::Json(value))
    }

    pub fn shared<T: Send + Sync + 'static>(value: T) -> Self {
        Self::value(ArgValue::shared(value))
    }

    /// Attach a teardown to run when the request's scope unwinds.
    pub fn with_teardown<F, Fut>(mut self, teardown: F) -> Self
    where
        F: FnOnce(TeardownOutcome) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.teardown = Some(Box::new(move |outcome| Box::pin(teardown(outcome))));
        self
    }
}

/// A callable producing one parameter's value at request time.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Diagnostic name, used in cycle and conflict error messages.
    fn name(&self) -> &str;

    /// The resolver's own declared inputs, classified recursively at
    /// registration time.
    fn params(&self) -> Vec<ParamDecl>;

    /// Produce the value. `args` contains exactly the inputs named by
    /// [`Resolve::params`], already validated.
    async fn resolve(&self, args: Args) -> Result<Resolved, HttpException>;

    /// Security-scheme capability: a resolver exposing a model is
    /// classified as a security dependency and surfaces the model for
    /// documentation.
    fn security_model(&self) -> Option<SecurityModel> {
        None
    }
}

/// Registration-time record for one resolver: the callable, its classified
/// and flattened parameter maps, and caching identity. Immutable once the
/// flattener finishes.
pub struct ResolverSpec {
    pub resolver: Arc<dyn Resolve>,
    /// Direct classification of the resolver's own declaration.
    pub params: ParamMap,
    /// Fully flattened map used for request-time resolution.
    pub flat_params: ParamMap,
    pub use_cache: bool,
    /// Sorted; part of the cache identity.
    pub scopes: Vec<String>,
}

/// Equality is structural over the resolver's identity and configuration,
/// never over the wrapper allocation: each declaration site builds its own
/// `Arc<ResolverSpec>`, and two sites referencing one resolver the same way
/// must merge as a no-op.
impl PartialEq for ResolverSpec {
    fn eq(&self, other: &Self) -> bool {
        resolver_id(&self.resolver) == resolver_id(&other.resolver)
            && self.use_cache == other.use_cache
            && self.scopes == other.scopes
            && self.params == other.params
    }
}

impl std::fmt::Debug for ResolverSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverSpec")
            .field("resolver", &self.resolver.name())
            .field("use_cache", &self.use_cache)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Identity used to dedupe repeated references to one resolver (with the
/// same security scopes) within a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resolver: usize,
    scopes: Vec<String>,
}

pub(crate) fn resolver_id(resolver: &Arc<dyn Resolve>) -> usize {
    Arc::as_ptr(resolver) as *const () as usize
}

impl ResolverSpec {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            resolver: resolver_id(&self.resolver),
            scopes: self.scopes.clone(),
        }
    }
}

struct FnResolver<F> {
    name: String,
    params: Vec<ParamDecl>,
    f: F,
}

#[async_trait]
impl<F, Fut> Resolve for FnResolver<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resolved, HttpException>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> Vec<ParamDecl> {
        self.params.clone()
    }

    async fn resolve(&self, args: Args) -> Result<Resolved, HttpException> {
        (self.f)(args).await
    }
}

/// Build a resolver from a closure and its declared inputs.
pub fn resolver_fn<F, Fut>(
    name: impl Into<String>,
    params: Vec<ParamDecl>,
    f: F,
) -> Arc<dyn Resolve>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resolved, HttpException>> + Send + 'static,
{
    Arc::new(FnResolver {
        name: name.into(),
        params,
        f,
    })
}
