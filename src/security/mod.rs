//! Built-in security schemes.
//!
//! A scheme is a dependency resolver that extracts a credential from the
//! request. Schemes declare the ambient request as their only input, expose
//! a [`SecurityModel`] for the documentation surface, and by default abort
//! the request when the credential is missing. With `auto_error` off a
//! missing credential resolves to null instead, letting a wrapping resolver
//! implement optional authentication.

use crate::dependency::{Resolve, Resolved};
use crate::exception::HttpException;
use crate::param::{AmbientKind, ParamDecl};
use crate::request::Args;
use async_trait::async_trait;
use serde_json::{Value, json};

/// Documentation-surface description of a security scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityModel {
    /// `apiKey`, `http` or `oauth2`.
    pub scheme_type: String,
    /// Scheme name as it appears in the documented components.
    pub name: String,
    /// Credential location for `apiKey` schemes.
    pub location: Option<String>,
    /// HTTP auth scheme (`bearer`) for `http` schemes.
    pub scheme: Option<String>,
    /// OAuth2 flow description.
    pub flows: Option<Value>,
}

fn ambient_request() -> Vec<ParamDecl> {
    vec![ParamDecl::ambient("request", AmbientKind::Request)]
}

fn missing_credential(auto_error: bool, exc: HttpException) -> Result<Resolved, HttpException> {
    if auto_error {
        Err(exc)
    } else {
        Ok(Resolved::json(Value::Null))
    }
}

/// API key read from a request header.
pub struct ApiKeyHeader {
    name: String,
    scheme_name: String,
    auto_error: bool,
}

impl ApiKeyHeader {
    pub fn new(header_name: impl Into<String>) -> Self {
        let name = header_name.into();
        Self {
            scheme_name: name.clone(),
            name,
            auto_error: true,
        }
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = name.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.auto_error = false;
        self
    }
}

#[async_trait]
impl Resolve for ApiKeyHeader {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> Vec<ParamDecl> {
        ambient_request()
    }

    async fn resolve(&self, args: Args) -> Result<Resolved, HttpException> {
        let request = args
            .request("request")
            .ok_or_else(|| HttpException::internal("security scheme missing request"))?;
        match request.header(&self.name) {
            Some(key) => Ok(Resolved::json(json!(key))),
            None => missing_credential(
                self.auto_error,
                HttpException::forbidden("Not authenticated"),
            ),
        }
    }

    fn security_model(&self) -> Option<SecurityModel> {
        Some(SecurityModel {
            scheme_type: "apiKey".into(),
            name: self.scheme_name.clone(),
            location: Some("header".into()),
            scheme: None,
            flows: None,
        })
    }
}

/// API key read from a query parameter.
pub struct ApiKeyQuery {
    name: String,
    scheme_name: String,
    auto_error: bool,
}

impl ApiKeyQuery {
    pub fn new(param_name: impl Into<String>) -> Self {
        let name = param_name.into();
        Self {
            scheme_name: name.clone(),
            name,
            auto_error: true,
        }
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = name.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.auto_error = false;
        self
    }
}

#[async_trait]
impl Resolve for ApiKeyQuery {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> Vec<ParamDecl> {
        ambient_request()
    }

    async fn resolve(&self, args: Args) -> Result<Resolved, HttpException> {
        let request = args
            .request("request")
            .ok_or_else(|| HttpException::internal("security scheme missing request"))?;
        match request.query(&self.name) {
            Some(key) => Ok(Resolved::json(json!(key))),
            None => missing_credential(
                self.auto_error,
                HttpException::forbidden("Not authenticated"),
            ),
        }
    }

    fn security_model(&self) -> Option<SecurityModel> {
        Some(SecurityModel {
            scheme_type: "apiKey".into(),
            name: self.scheme_name.clone(),
            location: Some("query".into()),
            scheme: None,
            flows: None,
        })
    }
}

/// API key read from a cookie.
pub struct ApiKeyCookie {
    name: String,
    scheme_name: String,
    auto_error: bool,
}

impl ApiKeyCookie {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        let name = cookie_name.into();
        Self {
            scheme_name: name.clone(),
            name,
            auto_error: true,
        }
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = name.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.auto_error = false;
        self
    }
}

#[async_trait]
impl Resolve for ApiKeyCookie {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> Vec<ParamDecl> {
        ambient_request()
    }

    async fn resolve(&self, args: Args) -> Result<Resolved, HttpException> {
        let request = args
            .request("request")
            .ok_or_else(|| HttpException::internal("security scheme missing request"))?;
        match request.cookie(&self.name) {
            Some(key) => Ok(Resolved::json(json!(key))),
            None => missing_credential(
                self.auto_error,
                HttpException::forbidden("Not authenticated"),
            ),
        }
    }

    fn security_model(&self) -> Option<SecurityModel> {
        Some(SecurityModel {
            scheme_type: "apiKey".into(),
            name: self.scheme_name.clone(),
            location: Some("cookie".into()),
            scheme: None,
            flows: None,
        })
    }
}

/// `Authorization: Bearer <token>` credentials.
///
/// Resolves to `{"scheme": "Bearer", "credentials": "<token>"}`.
pub struct HttpBearer {
    scheme_name: String,
    auto_error: bool,
}

impl HttpBearer {
    pub fn new() -> Self {
        Self {
            scheme_name: "HTTPBearer".into(),
            auto_error: true,
        }
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = name.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.auto_error = false;
        self
    }
}

impl Default for HttpBearer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolve for HttpBearer {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> Vec<ParamDecl> {
        ambient_request()
    }

    async fn resolve(&self, args: Args) -> Result<Resolved, HttpException> {
        let request = args
            .request("request")
            .ok_or_else(|| HttpException::internal("security scheme missing request"))?;
        let Some(authorization) = request.header("authorization") else {
            return missing_credential(
                self.auto_error,
                HttpException::forbidden("Not authenticated"),
            );
        };
        match authorization.split_once(' ') {
            Some((scheme, credentials))
                if scheme.eq_ignore_ascii_case("bearer") && !credentials.is_empty() =>
            {
                Ok(Resolved::json(json!({
                    "scheme": scheme,
                    "credentials": credentials,
                })))
            }
            _ => missing_credential(
                self.auto_error,
                HttpException::forbidden("Invalid authentication credentials"),
            ),
        }
    }

    fn security_model(&self) -> Option<SecurityModel> {
        Some(SecurityModel {
            scheme_type: "http".into(),
            name: self.scheme_name.clone(),
            location: None,
            scheme: Some("bearer".into()),
            flows: None,
        })
    }
}

/// OAuth2 password-flow bearer token.
///
/// A missing or malformed `Authorization` header answers 401 with a
/// `WWW-Authenticate: Bearer` challenge; the resolved value is the raw
/// token string.
pub struct OAuth2PasswordBearer {
    token_url: String,
    scheme_name: String,
    scopes: Vec<(String, String)>,
    auto_error: bool,
}

impl OAuth2PasswordBearer {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            scheme_name: "OAuth2PasswordBearer".into(),
            scopes: Vec::new(),
            auto_error: true,
        }
    }

    pub fn scheme_name(mut self, name: impl Into<String>) -> Self {
        self.scheme_name = name.into();
        self
    }

    pub fn scope(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.scopes.push((name.into(), description.into()));
        self
    }

    pub fn optional(mut self) -> Self {
        self.auto_error = false;
        self
    }
}

#[async_trait]
impl Resolve for OAuth2PasswordBearer {
    fn name(&self) -> &str {
        &self.scheme_name
    }

    fn params(&self) -> Vec<ParamDecl> {
        ambient_request()
    }

    async fn resolve(&self, args: Args) -> Result<Resolved, HttpException> {
        let request = args
            .request("request")
            .ok_or_else(|| HttpException::internal("security scheme missing request"))?;
        let token = request.header("authorization").and_then(|value| {
            value
                .split_once(' ')
                .filter(|(scheme, creds)| scheme.eq_ignore_ascii_case("bearer") && !creds.is_empty())
                .map(|(_, creds)| creds)
        });
        match token {
            Some(token) => Ok(Resolved::json(json!(token))),
            None => missing_credential(
                self.auto_error,
                HttpException::unauthorized("Not authenticated")
                    .with_header("www-authenticate", "Bearer"),
            ),
        }
    }

    fn security_model(&self) -> Option<SecurityModel> {
        let scopes: serde_json::Map<String, Value> = self
            .scopes
            .iter()
            .map(|(name, desc)| (name.clone(), json!(desc)))
            .collect();
        Some(SecurityModel {
            scheme_type: "oauth2".into(),
            name: self.scheme_name.clone(),
            location: None,
            scheme: None,
            flows: Some(json!({
                "password": {
                    "tokenUrl": self.token_url,
                    "scopes": scopes,
                }
            })),
        })
    }
}
