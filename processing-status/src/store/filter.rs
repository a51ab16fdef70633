//! Query fragments a [DocumentStore](super::DocumentStore) evaluates against raw documents.
//!
//! Evaluation is strict: a field that is present but has the wrong type or cannot be parsed is an
//! error, not a silent non-match, so a corrupt document never quietly drops out of a result set.
//! A condition may carry the value to use when its field is missing altogether.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// Right-hand side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterValue {
    Timestamp(DateTime<Utc>),
    Number(f64),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            FilterValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Comparison applied by [Filter::Compare].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
}

impl Comparison {
    fn holds<T: PartialOrd>(self, actual: &T, expected: &T) -> bool {
        match self {
            Comparison::Gt => actual > expected,
            Comparison::Gte => actual >= expected,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Gt => write!(f, ">"),
            Comparison::Gte => write!(f, ">="),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All of the inner filters match. An empty conjunction matches everything.
    And(Vec<Filter>),
    /// The value at `path` compares to `value` as `op` says.
    Compare {
        path: Vec<&'static str>,
        op: Comparison,
        value: FilterValue,
        /// Value assumed when the field is absent or null. `None` makes that an error.
        missing: Option<FilterValue>,
    },
}

impl Filter {
    pub fn gt(path: &[&'static str], value: FilterValue) -> Self {
        Self::with_comparison(path, Comparison::Gt, value, None)
    }

    pub fn gte(path: &[&'static str], value: FilterValue) -> Self {
        Self::with_comparison(path, Comparison::Gte, value, None)
    }

    pub fn gte_or(path: &[&'static str], value: FilterValue, missing: FilterValue) -> Self {
        Self::with_comparison(path, Comparison::Gte, value, Some(missing))
    }

    fn with_comparison(
        path: &[&'static str],
        op: Comparison,
        value: FilterValue,
        missing: Option<FilterValue>,
    ) -> Self {
        Filter::Compare {
            path: path.to_vec(),
            op,
            value,
            missing,
        }
    }

    /// Evaluates the filter against a document. The error describes the offending field.
    pub fn evaluate(&self, document: &Value) -> Result<bool, String> {
        match self {
            Filter::And(filters) => {
                for filter in filters {
                    if !filter.evaluate(document)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Compare {
                path,
                op,
                value,
                missing,
            } => {
                let actual = match lookup(document, path) {
                    Some(field) => parse_like(field, value)
                        .map_err(|reason| format!("{}: {reason}", path.join(".")))?,
                    None => missing.ok_or_else(|| format!("{} is missing", path.join(".")))?,
                };
                compare(*op, &actual, value)
                    .ok_or_else(|| format!("{} cannot be compared to {value}", path.join(".")))
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                let rendered: Vec<String> = filters.iter().map(ToString::to_string).collect();
                write!(f, "({})", rendered.join(" AND "))
            }
            Filter::Compare {
                path, op, value, ..
            } => write!(f, "{} {op} {value}", path.join(".")),
        }
    }
}

fn lookup<'a>(document: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(document, |current, segment| current.get(segment))
        .filter(|v| !v.is_null())
}

/// Reads `field` as the same kind of value as `like`.
fn parse_like(field: &Value, like: &FilterValue) -> Result<FilterValue, String> {
    match like {
        FilterValue::Timestamp(_) => {
            let raw = field
                .as_str()
                .ok_or_else(|| format!("expected a timestamp string, got {field}"))?;
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| FilterValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))
        }
        FilterValue::Number(_) => field
            .as_f64()
            .map(FilterValue::Number)
            .ok_or_else(|| format!("expected a number, got {field}")),
    }
}

fn compare(op: Comparison, actual: &FilterValue, expected: &FilterValue) -> Option<bool> {
    match (actual, expected) {
        (FilterValue::Timestamp(a), FilterValue::Timestamp(b)) => Some(op.holds(a, b)),
        (FilterValue::Number(a), FilterValue::Number(b)) => Some(op.holds(a, b)),
        _ => None,
    }
}
