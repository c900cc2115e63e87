use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::{Equivalent, IndexMap};
use serde::Serialize;

/// Identifies one field of a [`Row`]: a header name, or a 0-based position
/// when the source carries no header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldId {
    Name(String),
    Index(usize),
}

/// Hashes the payload only, so that a bare `&str` key hashes identically to
/// the `Name` variant it is equivalent to.
impl Hash for FieldId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FieldId::Name(name) => name.hash(state),
            FieldId::Index(index) => index.hash(state),
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Name(name) => f.write_str(name),
            FieldId::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for FieldId {
    fn from(name: &str) -> Self {
        FieldId::Name(name.to_owned())
    }
}

impl From<usize> for FieldId {
    fn from(index: usize) -> Self {
        FieldId::Index(index)
    }
}

/// Lets `Row::get` look up a named field with a plain `&str`.
impl Equivalent<FieldId> for str {
    fn equivalent(&self, key: &FieldId) -> bool {
        matches!(key, FieldId::Name(name) if name == self)
    }
}

/// One ordered record of field values from a tabular source.
///
/// Keys are unique and iteration order is insertion order, which is the
/// source field order. All rows produced by one source share the same key
/// set; readers reject mismatched field counts instead of padding.
///
/// # Examples
///
/// ```
/// use map_reduce_rs::core::row::Row;
///
/// let row = Row::from_headers(
///     &["state".to_owned(), "county".to_owned()],
///     vec!["FL".to_owned(), "Bay".to_owned()],
/// );
///
/// assert_eq!(row.get("county"), Some("Bay"));
/// assert_eq!(row.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: IndexMap<FieldId, String>,
}

impl Row {
    pub fn new() -> Self {
        Row {
            fields: IndexMap::new(),
        }
    }

    /// Builds a row keyed by header names, zipping headers with values in
    /// order. Headers and values must have the same length.
    pub fn from_headers(headers: &[String], values: Vec<String>) -> Self {
        debug_assert_eq!(headers.len(), values.len());
        Row {
            fields: headers
                .iter()
                .map(|h| FieldId::Name(h.clone()))
                .zip(values)
                .collect(),
        }
    }

    /// Builds a row keyed by 0-based field positions.
    pub fn from_values(values: Vec<String>) -> Self {
        Row {
            fields: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (FieldId::Index(i), v))
                .collect(),
        }
    }

    /// Value of a named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Value of a positional field (headerless sources).
    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.fields.get(&FieldId::Index(index)).map(String::as_str)
    }

    /// Value at a given insertion position, whatever the key kind.
    pub fn value_at(&self, position: usize) -> Option<&str> {
        self.fields
            .get_index(position)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldId> {
        self.fields.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.values().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &str)> {
        self.fields.iter().map(|(k, v)| (k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(FieldId, String)> for Row {
    fn from_iter<I: IntoIterator<Item = (FieldId, String)>>(iter: I) -> Self {
        Row {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A scalar field value of a mapped record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Str(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

/// The value used to bucket mapped records into accumulators.
///
/// Floats have no total equality, so a `Float` value keys through its
/// canonical display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Str(String),
    Int(i64),
}

impl GroupKey {
    /// The implicit single-group key used when no grouping is configured.
    pub(crate) const NO_KEY: &'static str = "__no_key__";
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Str(s) => f.write_str(s),
            GroupKey::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&Value> for GroupKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Str(s) => GroupKey::Str(s.clone()),
            Value::Int(i) => GroupKey::Int(*i),
            Value::Float(x) => GroupKey::Str(x.to_string()),
        }
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        GroupKey::Str(s.to_owned())
    }
}

impl From<String> for GroupKey {
    fn from(s: String) -> Self {
        GroupKey::Str(s)
    }
}

impl From<i64> for GroupKey {
    fn from(i: i64) -> Self {
        GroupKey::Int(i)
    }
}

/// An ordered mapping from field name to scalar value.
///
/// This is both the output of a map function and the running accumulator of
/// a group: the engine seeds a group with the first mapped record and
/// replaces it with the reducer's output on every later occurrence.
///
/// # Examples
///
/// ```
/// use map_reduce_rs::core::row::Record;
///
/// let mut record = Record::new();
/// record.insert("name", "FL - Bay");
/// record.insert("count", 1i64);
/// record.insert("lat", 30.1f64);
///
/// assert_eq!(record.get_i64("count"), Some(1));
/// assert_eq!(record.get_f64("lat"), Some(30.1));
/// assert_eq!(record.get_f64("count"), Some(1.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Record {
            fields: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// First field of the record, in insertion order.
    pub fn first(&self) -> Option<(&str, &Value)> {
        self.fields.get_index(0).map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (&'a str, Value)>>(iter: I) -> Self {
        Record {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        }
    }
}
