//! The narrow transport contract the resolution engine consumes.
//!
//! [`RequestData`] carries everything extracted from the wire (path params,
//! query, headers, cookies, lazily-read body); [`ResponseHandle`] and
//! [`BackgroundHandle`] are the mutable ambient objects dependencies and
//! handlers may touch; [`Args`] is the resolved value map handed to
//! handlers and resolvers.

use crate::exception::HttpException;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, Method, StatusCode};
use indexmap::IndexMap;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Body state: the wire body is read at most once per request.
enum BodyState {
    Empty,
    Unread(Body),
    Read(Bytes),
}

/// One incoming request, as seen by the resolution engine.
pub struct RequestData {
    method: Method,
    path: String,
    path_params: IndexMap<String, String>,
    query_items: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: IndexMap<String, String>,
    body: tokio::sync::Mutex<BodyState>,
    max_body_size: usize,
}

impl RequestData {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: IndexMap::new(),
            query_items: Vec::new(),
            headers: HeaderMap::new(),
            cookies: IndexMap::new(),
            body: tokio::sync::Mutex::new(BodyState::Empty),
            max_body_size: 1024 * 1024,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path_params.insert(name.into(), value.into());
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn set_query_string(&mut self, query: &str) {
        self.query_items = parse_query(query);
    }

    pub fn push_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query_items.push((name.into(), value.into()));
    }

    /// Last occurrence wins for repeated keys.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_items
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Case-insensitive header lookup; non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn set_cookies_from_header(&mut self, raw: &str) {
        for pair in raw.split(';') {
            let pair = pair.trim();
            if let Some((name, value)) = pair.split_once('=') {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = tokio::sync::Mutex::new(BodyState::Unread(body));
    }

    pub fn set_body_bytes(&mut self, bytes: impl Into<Bytes>) {
        self.body = tokio::sync::Mutex::new(BodyState::Read(bytes.into()));
    }

    pub fn set_max_body_size(&mut self, limit: usize) {
        self.max_body_size = limit;
    }

    /// Read the body, at most once. Later calls return the buffered bytes.
    pub async fn bytes(&self) -> Result<Bytes, HttpException> {
        let mut state = self.body.lock().await;
        match &mut *state {
            BodyState::Empty => Ok(Bytes::new()),
            BodyState::Read(bytes) => Ok(bytes.clone()),
            BodyState::Unread(_) => {
                let BodyState::Unread(body) = std::mem::replace(&mut *state, BodyState::Empty)
                else {
                    unreachable!("body state changed under lock");
                };
                let bytes = to_bytes(body, self.max_body_size).await.map_err(|_| {
                    HttpException::new(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "Request body too large",
                    )
                })?;
                *state = BodyState::Read(bytes.clone());
                Ok(bytes)
            }
        }
    }
}

pub fn parse_query(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default()
}

/// Mutable response state dependencies and handlers may touch while the
/// request is being resolved. A status set here overrides the route's
/// declared status; headers are merged into the final response.
#[derive(Debug, Default)]
pub struct AmbientResponse {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseHandle(Arc<Mutex<AmbientResponse>>);

impl ResponseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.0.lock().expect("ambient response poisoned").status = Some(status);
    }

    pub fn insert_header(&self, name: &str, value: &str) {
        use axum::http::{HeaderName, HeaderValue};
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.0
                .lock()
                .expect("ambient response poisoned")
                .headers
                .insert(name, value);
        }
    }

    pub fn snapshot(&self) -> (Option<StatusCode>, HeaderMap) {
        let guard = self.0.lock().expect("ambient response poisoned");
        (guard.status, guard.headers.clone())
    }
}

type BackgroundFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Collector for work deferred until after the response is produced.
/// Task failures are logged, never surfaced to the client.
#[derive(Clone, Default)]
pub struct BackgroundHandle(Arc<Mutex<Vec<BackgroundFuture>>>);

impl BackgroundHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task<F>(&self, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.0
            .lock()
            .expect("background tasks poisoned")
            .push(Box::pin(task));
    }

    pub fn len(&self) -> usize {
        self.0.lock().expect("background tasks poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn drain(&self) -> Vec<BackgroundFuture> {
        std::mem::take(&mut *self.0.lock().expect("background tasks poisoned"))
    }
}

/// One resolved argument value.
#[derive(Clone)]
pub enum ArgValue {
    /// Validated wire data, canonical JSON.
    Json(Value),
    /// An opaque value produced by a dependency resolver.
    Shared(Arc<dyn Any + Send + Sync>),
    /// Ambient: the request itself.
    Request(Arc<RequestData>),
    /// Ambient: the mutable response.
    Response(ResponseHandle),
    /// Ambient: the background-task collector.
    Background(BackgroundHandle),
}

impl std::fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(v) => write!(f, "Json({v})"),
            Self::Shared(_) => write!(f, "Shared(..)"),
            Self::Request(_) => write!(f, "Request"),
            Self::Response(_) => write!(f, "Response"),
            Self::Background(_) => write!(f, "Background"),
        }
    }
}

impl ArgValue {
    pub fn shared<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Shared(Arc::new(value))
    }
}

/// The resolved value map, keyed by parameter name, in resolution order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: IndexMap<String, ArgValue>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn json(&self, name: &str) -> Option<&Value> {
        match self.values.get(name)? {
            ArgValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Deserialize a JSON argument into a concrete type.
    pub fn parse<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, HttpException> {
        let value = self
            .json(name)
            .ok_or_else(|| HttpException::internal(format!("missing argument `{name}`")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| HttpException::internal(format!("argument `{name}`: {e}")))
    }

    /// Downcast a dependency-produced value.
    pub fn shared<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        match self.values.get(name)? {
            ArgValue::Shared(any) => Arc::clone(any).downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn request(&self, name: &str) -> Option<Arc<RequestData>> {
        match self.values.get(name)? {
            ArgValue::Request(req) => Some(Arc::clone(req)),
            _ => None,
        }
    }

    pub fn response(&self, name: &str) -> Option<ResponseHandle> {
        match self.values.get(name)? {
            ArgValue::Response(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn background(&self, name: &str) -> Option<BackgroundHandle> {
        match self.values.get(name)? {
            ArgValue::Background(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Keep only the given names; used to pass a callable exactly the
    /// arguments its own declaration names.
    pub fn filter(&self, names: &[String]) -> Args {
        let values = self
            .values
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Args { values }
    }

    pub fn merge(&mut self, other: Args) {
        for (name, value) in other.values {
            self.values.insert(name, value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}
