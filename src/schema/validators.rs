use regex::Regex;
use serde_json::Value;

/// A compiled pattern rule.
///
/// Equality is defined over the pattern source so descriptors carrying the
/// same pattern compare equal during safe-merge.
#[derive(Debug, Clone)]
pub struct PatternRule {
    source: String,
    regex: Regex,
}

impl PatternRule {
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let regex = Regex::new(&source)?;
        Ok(Self { source, regex })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for PatternRule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One predicate rule applied to a coerced value.
///
/// Rules are ordered; the first failing rule contributes its message and
/// later rules still run so a field can report several problems at once.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Ge(f64),
    Gt(f64),
    Le(f64),
    Lt(f64),
    MinLength(usize),
    MaxLength(usize),
    Pattern(PatternRule),
}

impl Validator {
    /// Check a coerced JSON value, returning an error message on failure.
    ///
    /// Rules that do not apply to the value's type pass silently; the field
    /// coercion step already rejected values of the wrong shape.
    pub fn check(&self, value: &Value) -> Option<String> {
        match self {
            Self::Ge(bound) => number_rule(value, |n| n >= *bound)
                .then_some(format!("Must be greater than or equal to {bound}.")),
            Self::Gt(bound) => {
                number_rule(value, |n| n > *bound).then_some(format!("Must be greater than {bound}."))
            }
            Self::Le(bound) => number_rule(value, |n| n <= *bound)
                .then_some(format!("Must be less than or equal to {bound}.")),
            Self::Lt(bound) => {
                number_rule(value, |n| n < *bound).then_some(format!("Must be less than {bound}."))
            }
            Self::MinLength(min) => length_rule(value, |len| len >= *min)
                .then_some(format!("Shorter than minimum length {min}.")),
            Self::MaxLength(max) => length_rule(value, |len| len <= *max)
                .then_some(format!("Longer than maximum length {max}.")),
            Self::Pattern(rule) => match value.as_str() {
                Some(s) if !rule.is_match(s) => {
                    Some("String does not match expected pattern.".to_string())
                }
                _ => None,
            },
        }
    }
}

fn number_rule(value: &Value, ok: impl Fn(f64) -> bool) -> bool {
    value.as_f64().is_some_and(|n| !ok(n))
}

fn length_rule(value: &Value, ok: impl Fn(usize) -> bool) -> bool {
    let len = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    };
    len.is_some_and(|len| !ok(len))
}
