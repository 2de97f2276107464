use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which catalog's identifier space a [`WorkItem`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// TMDB's own numeric id.
    Internal,
    /// Cross-catalog IMDb id (`tt…`).
    External,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Internal => f.write_str("internal"),
            Namespace::External => f.write_str("external"),
        }
    }
}

/// One unit of work produced by an identifier source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    id: String,
    namespace: Namespace,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            id: id.into(),
            namespace,
        }
    }

    pub fn internal(id: impl Into<String>) -> Self {
        Self::new(id, Namespace::Internal)
    }

    pub fn external(id: impl Into<String>) -> Self {
        Self::new(id, Namespace::External)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }
}

/// A confirmed cross-reference between both namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPair {
    pub external_id: String,
    pub internal_id: String,
}

/// Outcome of a successful cross-reference lookup.
///
/// Zero matches is a valid answer, distinct from a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedPair),
    NotFound,
}

/// Unparsed JSON payload returned by one catalog for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDetail(Value);

impl RawDetail {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Non-empty, non-`N/A` string field, trimmed.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("n/a"))
    }

    pub fn is_object(&self) -> bool {
        self.0.is_object()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for RawDetail {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Normalized output unit combining both catalogs for one title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub id: String,
    pub external_id: String,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub budget: Option<f64>,
    pub revenue: Option<f64>,
    pub runtime: Option<f64>,
    pub genres: Vec<String>,
    pub imdb_rating: Option<f64>,
    pub rotten_rating: Option<f64>,
    pub metacritic_rating: Option<f64>,
    pub raw_a: RawDetail,
    pub raw_b: RawDetail,
}
