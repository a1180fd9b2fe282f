//! Parameter descriptors and the declarative marker API.
//!
//! A route declares its inputs as [`ParamDecl`]s; the classifier
//! ([`classify`]) turns them into [`ParamSpec`] descriptors grouped by
//! [`ParamKind`]. Descriptors are built once at registration and are
//! immutable afterwards.

pub mod classify;

pub use classify::classify;

use crate::dependency::{Resolve, ResolverSpec};
use crate::schema::{FieldType, Field, Validator};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display};

/// Where a parameter's value comes from: one of the five wire locations or a
/// synthetic origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ParamKind {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    Form,
    NoParam,
    Dependency,
    Security,
}

/// Ambient request-context values substituted directly by the resolver,
/// never read from wire data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientKind {
    Request,
    Response,
    BackgroundTasks,
}

/// Registration-time record describing one parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub field: Option<Field>,
    pub ambient: Option<AmbientKind>,
    pub resolver: Option<Arc<ResolverSpec>>,
    pub title: Option<String>,
    pub deprecated: bool,
    pub include_in_schema: bool,
}

impl PartialEq for ParamSpec {
    fn eq(&self, other: &Self) -> bool {
        // Structural comparison: the wrapper is allocated per declaration
        // site, so pointer equality would split identical descriptors.
        let same_resolver = match (&self.resolver, &other.resolver) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        };
        self.name == other.name
            && self.kind == other.kind
            && self.field == other.field
            && self.ambient == other.ambient
            && same_resolver
            && self.title == other.title
            && self.deprecated == other.deprecated
            && self.include_in_schema == other.include_in_schema
    }
}

/// Marker carrying a wire parameter's configuration: optional explicit source
/// kind, declared type, default, validation shorthand and documentation
/// metadata. The kind-less [`Param::auto`] constructor lets the classifier
/// infer `path` vs `query` from the route's path template.
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) kind: Option<ParamKind>,
    pub(crate) ty: FieldType,
    pub(crate) default: Option<Value>,
    pub(crate) ge: Option<f64>,
    pub(crate) gt: Option<f64>,
    pub(crate) le: Option<f64>,
    pub(crate) lt: Option<f64>,
    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) pattern: Option<String>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) alias: Option<String>,
    pub(crate) convert_underscores: Option<bool>,
    pub(crate) title: Option<String>,
    pub(crate) deprecated: bool,
    pub(crate) include_in_schema: bool,
}

impl Param {
    fn with_kind(kind: Option<ParamKind>, ty: FieldType) -> Self {
        Self {
            kind,
            ty,
            default: None,
            ge: None,
            gt: None,
            le: None,
            lt: None,
            min_length: None,
            max_length: None,
            pattern: None,
            validators: Vec::new(),
            alias: None,
            convert_underscores: None,
            title: None,
            deprecated: false,
            include_in_schema: true,
        }
    }

    /// Infer the kind: `path` when the name matches a placeholder in the
    /// route's path template, `query` otherwise.
    pub fn auto(ty: FieldType) -> Self {
        Self::with_kind(None, ty)
    }

    pub fn path(ty: FieldType) -> Self {
        Self::with_kind(Some(ParamKind::Path), ty)
    }

    pub fn query(ty: FieldType) -> Self {
        Self::with_kind(Some(ParamKind::Query), ty)
    }

    pub fn header(ty: FieldType) -> Self {
        Self::with_kind(Some(ParamKind::Header), ty)
    }

    pub fn cookie(ty: FieldType) -> Self {
        Self::with_kind(Some(ParamKind::Cookie), ty)
    }

    pub fn body(ty: FieldType) -> Self {
        Self::with_kind(Some(ParamKind::Body), ty)
    }

    pub fn form(ty: FieldType) -> Self {
        Self::with_kind(Some(ParamKind::Form), ty)
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn ge(mut self, bound: f64) -> Self {
        self.ge = Some(bound);
        self
    }

    pub fn gt(mut self, bound: f64) -> Self {
        self.gt = Some(bound);
        self
    }

    pub fn le(mut self, bound: f64) -> Self {
        self.le = Some(bound);
        self
    }

    pub fn lt(mut self, bound: f64) -> Self {
        self.lt = Some(bound);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Explicit validator rule. Overridden (with a logged warning) when any
    /// shorthand bound is also given.
    pub fn validator(mut self, rule: Validator) -> Self {
        self.validators.push(rule);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn convert_underscores(mut self, convert: bool) -> Self {
        self.convert_underscores = Some(convert);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Exclude the parameter from the documentation surface. Resolution is
    /// unaffected.
    pub fn hidden(mut self) -> Self {
        self.include_in_schema = false;
        self
    }
}

/// One declared input of a route handler or dependency resolver.
#[derive(Clone)]
pub enum ParamDecl {
    /// A wire parameter described by a [`Param`] marker.
    Field { name: String, param: Param },
    /// A resolved dependency.
    Depends {
        name: String,
        resolver: Arc<dyn Resolve>,
        use_cache: bool,
    },
    /// A security dependency, resolved before everything else.
    Security {
        name: String,
        scheme: Arc<dyn Resolve>,
        scopes: Vec<String>,
        use_cache: bool,
    },
    /// Ambient request-context value (request, mutable response,
    /// background-task collector).
    Ambient { name: String, kind: AmbientKind },
    /// Supplied outside this engine's control; skipped entirely.
    External { name: String },
}

impl ParamDecl {
    pub fn field(name: impl Into<String>, param: Param) -> Self {
        Self::Field {
            name: name.into(),
            param,
        }
    }

    pub fn depends(name: impl Into<String>, resolver: Arc<dyn Resolve>) -> Self {
        Self::Depends {
            name: name.into(),
            resolver,
            use_cache: true,
        }
    }

    /// A dependency resolved fresh on every reference within a request.
    pub fn depends_no_cache(name: impl Into<String>, resolver: Arc<dyn Resolve>) -> Self {
        Self::Depends {
            name: name.into(),
            resolver,
            use_cache: false,
        }
    }

    pub fn security(name: impl Into<String>, scheme: Arc<dyn Resolve>) -> Self {
        Self::Security {
            name: name.into(),
            scheme,
            scopes: Vec::new(),
            use_cache: true,
        }
    }

    pub fn security_scopes(
        name: impl Into<String>,
        scheme: Arc<dyn Resolve>,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Security {
            name: name.into(),
            scheme,
            scopes: scopes.into_iter().map(Into::into).collect(),
            use_cache: true,
        }
    }

    pub fn ambient(name: impl Into<String>, kind: AmbientKind) -> Self {
        Self::Ambient {
            name: name.into(),
            kind,
        }
    }

    pub fn external(name: impl Into<String>) -> Self {
        Self::External { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Field { name, .. }
            | Self::Depends { name, .. }
            | Self::Security { name, .. }
            | Self::Ambient { name, .. }
            | Self::External { name } => name,
        }
    }
}

/// Per-source-kind descriptor maps, in declaration order.
///
/// Security descriptors appear both in `security` (driving the
/// resolve-first ordering) and in `dependencies` (driving flattening and
/// caching), mirroring how they are declared once but participate in both
/// protocols.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamMap {
    pub path: IndexMap<String, ParamSpec>,
    pub query: IndexMap<String, ParamSpec>,
    pub header: IndexMap<String, ParamSpec>,
    pub cookie: IndexMap<String, ParamSpec>,
    pub body: IndexMap<String, ParamSpec>,
    pub form: IndexMap<String, ParamSpec>,
    pub ambient: IndexMap<String, ParamSpec>,
    pub dependencies: IndexMap<String, ParamSpec>,
    pub security: IndexMap<String, ParamSpec>,
}

impl ParamMap {
    pub fn insert(&mut self, spec: ParamSpec) {
        let name = spec.name.clone();
        match spec.kind {
            ParamKind::Path => {
                self.path.insert(name, spec);
            }
            ParamKind::Query => {
                self.query.insert(name, spec);
            }
            ParamKind::Header => {
                self.header.insert(name, spec);
            }
            ParamKind::Cookie => {
                self.cookie.insert(name, spec);
            }
            ParamKind::Body => {
                self.body.insert(name, spec);
            }
            ParamKind::Form => {
                self.form.insert(name, spec);
            }
            ParamKind::NoParam => {
                self.ambient.insert(name, spec);
            }
            ParamKind::Dependency => {
                self.dependencies.insert(name, spec);
            }
            ParamKind::Security => {
                self.security.insert(name.clone(), spec.clone());
                self.dependencies.insert(name, spec);
            }
        }
    }

    /// The wire-location maps in resolution order.
    pub fn wire_maps(&self) -> [(ParamKind, &IndexMap<String, ParamSpec>); 4] {
        [
            (ParamKind::Path, &self.path),
            (ParamKind::Query, &self.query),
            (ParamKind::Header, &self.header),
            (ParamKind::Cookie, &self.cookie),
        ]
    }

    /// Names declared at this level, deduplicated, in declaration-map order.
    pub fn root_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let maps = [
            &self.path,
            &self.query,
            &self.header,
            &self.cookie,
            &self.body,
            &self.form,
            &self.ambient,
            &self.dependencies,
            &self.security,
        ];
        for map in maps {
            for name in map.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.root_names().is_empty()
    }
}

/// Build the single-field validator for a marker, merging shorthand bounds
/// and explicit validators. Shorthand wins when both are present; that is a
/// documented warning, never an error.
pub(crate) fn build_validators(name: &str, param: &Param) -> crate::error::Result<Vec<Validator>> {
    let mut shorthand = Vec::new();
    if let Some(bound) = param.ge {
        shorthand.push(Validator::Ge(bound));
    }
    if let Some(bound) = param.gt {
        shorthand.push(Validator::Gt(bound));
    }
    if let Some(bound) = param.le {
        shorthand.push(Validator::Le(bound));
    }
    if let Some(bound) = param.lt {
        shorthand.push(Validator::Lt(bound));
    }
    if let Some(len) = param.min_length {
        shorthand.push(Validator::MinLength(len));
    }
    if let Some(len) = param.max_length {
        shorthand.push(Validator::MaxLength(len));
    }
    if let Some(pattern) = &param.pattern {
        let rule = crate::schema::PatternRule::new(pattern.clone()).map_err(|source| {
            crate::error::ParametraError::InvalidPattern {
                name: name.to_string(),
                pattern: pattern.clone(),
                source,
            }
        })?;
        shorthand.push(Validator::Pattern(rule));
    }

    if !shorthand.is_empty() && !param.validators.is_empty() {
        tracing::warn!(
            param = name,
            "both shorthand bounds and explicit validators given; shorthand wins"
        );
        return Ok(shorthand);
    }
    if shorthand.is_empty() {
        Ok(param.validators.clone())
    } else {
        Ok(shorthand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_are_kebab_case() {
        assert_eq!(ParamKind::Query.to_string(), "query");
        assert_eq!(ParamKind::NoParam.to_string(), "no-param");
    }

    #[test]
    fn shorthand_wins_over_explicit_validators() {
        let param = Param::query(FieldType::Integer)
            .ge(1.0)
            .validator(Validator::Le(5.0));
        let rules = build_validators("limit", &param).unwrap();
        assert_eq!(rules, vec![Validator::Ge(1.0)]);
    }

    #[test]
    fn explicit_validators_used_without_shorthand() {
        let param = Param::query(FieldType::Integer).validator(Validator::Le(5.0));
        let rules = build_validators("limit", &param).unwrap();
        assert_eq!(rules, vec![Validator::Le(5.0)]);
    }

    #[test]
    fn invalid_pattern_is_registration_error() {
        let param = Param::query(FieldType::String).pattern("(unclosed");
        assert!(build_validators("q", &param).is_err());
    }

    #[test]
    fn marker_default_recorded() {
        let param = Param::query(FieldType::Integer).default_value(json!(10));
        assert_eq!(param.default, Some(json!(10)));
    }
}
