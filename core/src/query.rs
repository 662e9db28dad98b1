//! Query-string construction.
//!
//! Empty values (`""` and null) are dropped before serialization and never
//! reach the wire. Everything else becomes `key=value`, joined by `&`, in
//! insertion order.

use std::fmt;

use serde::Deserialize;

/// A scalar query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Null,
}

impl QueryValue {
    /// Values that are left out of the serialized query.
    pub fn is_empty(&self) -> bool {
        match self {
            QueryValue::Str(s) => s.is_empty(),
            QueryValue::Null => true,
            _ => false,
        }
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Str(s) => f.write_str(s),
            QueryValue::Int(n) => write!(f, "{n}"),
            QueryValue::UInt(n) => write!(f, "{n}"),
            QueryValue::Float(n) => write!(f, "{n}"),
            QueryValue::Bool(b) => write!(f, "{b}"),
            QueryValue::Null => Ok(()),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Int(value.into())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::UInt(value.into())
    }
}

impl From<u64> for QueryValue {
    fn from(value: u64) -> Self {
        QueryValue::UInt(value)
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(QueryValue::Null, Into::into)
    }
}

/// How keys and values are written into the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryEncoding {
    /// Percent-encode keys and values.
    #[default]
    Percent,
    /// Write keys and values verbatim. Only safe for trusted, simple values.
    Raw,
}

/// Ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, QueryValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing value in its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serialize to `key=value&...`, skipping empty values.
    pub fn serialize(&self, encoding: QueryEncoding) -> String {
        self.entries
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| match encoding {
                QueryEncoding::Percent => {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(&value.to_string()))
                }
                QueryEncoding::Raw => format!("{key}={value}"),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<QueryValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Append the serialized `params` to `endpoint`.
///
/// Returns `endpoint` unchanged when nothing survives filtering. An endpoint
/// that already has a query string is extended with `&`.
pub fn with_query(endpoint: &str, params: &QueryParams, encoding: QueryEncoding) -> String {
    let query = params.serialize(encoding);
    if query.is_empty() {
        return endpoint.to_string();
    }
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}{query}")
}
