//! Stable cache keys.
//!
//! A [`QueryKey`] is an ordered list of scope segments (entity, sub-resource,
//! id) plus a set of named parameters (filters, pagination, request options).
//! Two logically identical queries produce equal keys regardless of the order
//! in which parameters were supplied, and null parameters are dropped so that
//! an omitted filter and an explicitly empty one share a cache entry.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while building a key from a parameter record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryKeyError {
    /// The parameter record could not be serialized.
    #[error("query parameters could not be serialized: {0}")]
    Serialize(String),

    /// The parameter record serialized to something other than an object.
    #[error("query parameters must serialize to an object, got {found}")]
    NotAnObject {
        /// JSON type that was produced instead
        found: &'static str,
    },
}

/// A deterministic composite cache key.
///
/// Parameter values are stored in canonical JSON form (object members sorted,
/// nulls removed) so that equality, hashing and ordering are structural.
///
/// # Example
///
/// ```
/// use marquee_core::QueryKey;
///
/// let a = QueryKey::builder(["genres"]).param("name", "Rock").param("page", 1).build();
/// let b = QueryKey::builder(["genres"]).param("page", 1).param("name", "Rock").build();
///
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), r#"["genres",{"name":"Rock","page":1}]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    scope: Vec<String>,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    /// A key with scope segments and no parameters.
    #[must_use]
    pub fn new<I, S>(scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: scope.into_iter().map(Into::into).collect(),
            params: BTreeMap::new(),
        }
    }

    /// Start building a key for the given scope.
    #[must_use]
    pub fn builder<I, S>(scope: I) -> QueryKeyBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryKeyBuilder {
            key: Self::new(scope),
        }
    }

    /// Build a key from any serializable parameter record.
    ///
    /// `None` fields and `null` values are dropped. A record that serializes
    /// to `null` (such as `()`) yields a key without parameters.
    ///
    /// # Errors
    ///
    /// Returns [`QueryKeyError`] if the record fails to serialize or is not
    /// an object.
    pub fn from_params<I, S, P>(scope: I, params: &P) -> Result<Self, QueryKeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        P: Serialize + ?Sized,
    {
        let value = serde_json::to_value(params).map_err(|e| QueryKeyError::Serialize(e.to_string()))?;

        let mut builder = Self::builder(scope);
        match value {
            Value::Null => {},
            Value::Object(members) => {
                for (name, value) in members {
                    builder = builder.param(name, value);
                }
            },
            other => {
                return Err(QueryKeyError::NotAnObject {
                    found: json_type(&other),
                });
            },
        }
        Ok(builder.build())
    }

    /// Scope segments, outermost first.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Canonical JSON of a parameter, if present.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Parameters in name order, values in canonical JSON.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Whether this key's scope begins with `prefix`.
    ///
    /// Used for invalidation: invalidating `["movies"]` also invalidates
    /// `["movies", "42"]` and every filtered `["movies"]` listing.
    #[must_use]
    pub fn starts_with<S: AsRef<str>>(&self, prefix: &[S]) -> bool {
        prefix.len() <= self.scope.len()
            && prefix
                .iter()
                .zip(&self.scope)
                .all(|(wanted, segment)| wanted.as_ref() == segment)
    }

    /// Whether this key falls under `prefix`: its scope starts with the
    /// prefix scope and it carries every parameter of the prefix unchanged.
    #[must_use]
    pub fn is_within(&self, prefix: &Self) -> bool {
        self.starts_with(&prefix.scope)
            && prefix
                .params
                .iter()
                .all(|(name, value)| self.params.get(name) == Some(value))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (position, segment) in self.scope.iter().enumerate() {
            if position > 0 {
                f.write_str(",")?;
            }
            f.write_str(&serde_json::to_string(segment).map_err(|_| fmt::Error)?)?;
        }
        if !self.params.is_empty() {
            if !self.scope.is_empty() {
                f.write_str(",")?;
            }
            f.write_str("{")?;
            for (position, (name, value)) in self.params.iter().enumerate() {
                if position > 0 {
                    f.write_str(",")?;
                }
                let name = serde_json::to_string(name).map_err(|_| fmt::Error)?;
                write!(f, "{name}:{value}")?;
            }
            f.write_str("}")?;
        }
        f.write_str("]")
    }
}

/// Builder for [`QueryKey`].
#[derive(Debug, Clone)]
#[must_use]
pub struct QueryKeyBuilder {
    key: QueryKey,
}

impl QueryKeyBuilder {
    /// Add a parameter. Null values (including `None`) are ignored and a
    /// later value for the same name replaces an earlier one.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        match strip_nulls(value.into()) {
            Value::Null => {
                self.key.params.remove(&name);
            },
            value => {
                self.key.params.insert(name, value.to_string());
            },
        }
        self
    }

    /// Append a scope segment.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.key.scope.push(segment.into());
        self
    }

    /// Finish the key.
    #[must_use]
    pub fn build(self) -> QueryKey {
        self.key
    }
}

/// Remove null members from objects, recursively. Array elements keep their
/// positions, so nulls inside arrays are preserved.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(members) => {
            let cleaned: Map<String, Value> = members
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect();
            Value::Object(cleaned)
        },
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[derive(Serialize)]
    struct MovieFilters {
        title: Option<String>,
        year: Option<u32>,
    }

    #[test]
    fn test_parameter_order_does_not_matter() {
        let a = QueryKey::builder(["genres"]).param("name", "Rock").param("page", 1).build();
        let b = QueryKey::builder(["genres"]).param("page", 1).param("name", "Rock").build();
        let c = QueryKey::builder(["genres"]).param("name", "Rock").param("page", 2).build();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_null_parameters_are_dropped() {
        let with_none = QueryKey::from_params(
            ["movies"],
            &MovieFilters {
                title: None,
                year: Some(2020),
            },
        )
        .expect("object params");
        let without = QueryKey::builder(["movies"]).param("year", 2020).build();

        assert_eq!(with_none, without);
        assert_eq!(with_none.param("title"), None);
    }

    #[test]
    fn test_nested_nulls_are_dropped() {
        let a = QueryKey::builder(["showings"])
            .param("range", json!({ "from": "2024-01-01", "to": null }))
            .build();
        let b = QueryKey::builder(["showings"])
            .param("range", json!({ "from": "2024-01-01" }))
            .build();

        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_objects_are_canonical() {
        let a = QueryKey::builder(["seats"]).param("filter", json!({ "row": "A", "seat": 3 })).build();
        let b = QueryKey::builder(["seats"]).param("filter", json!({ "seat": 3, "row": "A" })).build();

        assert_eq!(a, b);
    }

    #[test]
    fn test_scope_distinguishes_keys() {
        let genres = QueryKey::builder(["genres"]).param("page", 1).build();
        let persons = QueryKey::builder(["persons"]).param("page", 1).build();

        assert_ne!(genres, persons);
    }

    #[test]
    fn test_value_types_are_not_conflated() {
        let number = QueryKey::builder(["movies"]).param("year", 2020).build();
        let string = QueryKey::builder(["movies"]).param("year", "2020").build();

        assert_ne!(number, string);
    }

    #[test]
    fn test_non_object_params_are_rejected() {
        let err = QueryKey::from_params(["movies"], &[1, 2]).expect_err("array is not a record");
        assert_eq!(err, QueryKeyError::NotAnObject { found: "array" });
    }

    #[test]
    fn test_unit_params_yield_plain_scope() {
        let key = QueryKey::from_params(["genres"], &()).expect("unit is empty");
        assert_eq!(key, QueryKey::new(["genres"]));
    }

    #[test]
    fn test_starts_with_matches_scope_prefix() {
        let key = QueryKey::builder(["movies"]).segment("42").segment("credits").build();

        assert!(key.starts_with(&["movies"]));
        assert!(key.starts_with(&["movies", "42"]));
        assert!(!key.starts_with(&["movies", "7"]));
        assert!(!key.starts_with(&["movies", "42", "credits", "cast"]));
        assert!(key.starts_with::<&str>(&[]));
    }

    #[test]
    fn test_is_within_requires_scope_and_params() {
        let key = QueryKey::builder(["movies"]).param("genre", "Drama").param("page", 2).build();

        assert!(key.is_within(&QueryKey::new(["movies"])));
        assert!(key.is_within(&QueryKey::builder(["movies"]).param("genre", "Drama").build()));
        assert!(!key.is_within(&QueryKey::builder(["movies"]).param("genre", "Horror").build()));
        assert!(!key.is_within(&QueryKey::new(["genres"])));
    }

    #[test]
    fn test_display_is_canonical_json() {
        let key = QueryKey::builder(["movies", "list"])
            .param("title", "Alien")
            .param("page", 3)
            .build();

        assert_eq!(key.to_string(), r#"["movies","list",{"page":3,"title":"Alien"}]"#);
        assert_eq!(QueryKey::new(["genres"]).to_string(), r#"["genres"]"#);
    }

    proptest! {
        #[test]
        fn prop_insertion_order_is_irrelevant(
            params in proptest::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..6),
        ) {
            let forward = params
                .iter()
                .fold(QueryKey::builder(["q"]), |b, (k, v)| b.param(k.clone(), *v))
                .build();
            let backward = params
                .iter()
                .rev()
                .fold(QueryKey::builder(["q"]), |b, (k, v)| b.param(k.clone(), *v))
                .build();

            prop_assert_eq!(forward, backward);
        }
    }
}
