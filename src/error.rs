use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParametraError>;

/// Registration-time errors.
///
/// Every variant here indicates a programming error in the API definition,
/// not a runtime condition. They are raised while a [`crate::endpoint::Route`]
/// is turned into an endpoint model and abort application startup; nothing in
/// the request path produces them.
#[derive(Debug, Error)]
pub enum ParametraError {
    #[error("parameter `{name}` declared more than once on route `{path}`")]
    DuplicateDeclaration { name: String, path: String },

    #[error("parameter `{name}`: type `{ty}` is not resolvable as a single field")]
    UnresolvableField { name: String, ty: String },

    #[error(
        "conflicting declarations for `{name}` in `{kind}` parameters: `{first}` vs `{second}`"
    )]
    ConflictingParams {
        name: String,
        kind: String,
        first: String,
        second: String,
    },

    #[error("circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    #[error("path parameter `{name}` has no `{{{name}}}` placeholder in `{path}`")]
    UnknownPathParam { name: String, path: String },

    #[error("parameter `{name}`: invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("route `{path}` registered without a handler")]
    MissingHandler { path: String },

    #[error("route `{path}` declares no HTTP method")]
    MissingMethod { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_sides() {
        let err = ParametraError::ConflictingParams {
            name: "limit".into(),
            kind: "query".into(),
            first: "Integer".into(),
            second: "String".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("limit"));
        assert!(msg.contains("Integer"));
        assert!(msg.contains("String"));
    }

    #[test]
    fn cycle_message_contains_path() {
        let err = ParametraError::CircularDependency {
            cycle: "db -> session -> db".into(),
        };
        assert!(err.to_string().contains("db -> session -> db"));
    }
}
