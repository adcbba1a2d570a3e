use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::decimal::FixedDecimal;
use crate::record::DATE_FORMAT;

const DECIMAL_TAG: &str = "$numberDecimal";
const DATE_TAG: &str = "$date";

/// A typed value held by a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Null,
    Text(String),
    Int(i64),
    Decimal(FixedDecimal),
    Date(NaiveDate),
}

impl FieldValue {
    /// JSON encoding used on disk. Decimals and dates are wrapped in a tagged
    /// object so they read back with their type.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Int(i) => json!(i),
            FieldValue::Decimal(d) => json!({ DECIMAL_TAG: d.to_string() }),
            FieldValue::Date(d) => json!({ DATE_TAG: d.format(DATE_FORMAT).to_string() }),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Int)
                .ok_or_else(|| format!("unsupported number {n}")),
            Value::Object(map) if map.len() == 1 => {
                if let Some(Value::String(s)) = map.get(DECIMAL_TAG) {
                    return FixedDecimal::parse_exact(s)
                        .map(FieldValue::Decimal)
                        .map_err(|e| format!("bad decimal '{s}': {e}"));
                }
                if let Some(Value::String(s)) = map.get(DATE_TAG) {
                    return NaiveDate::parse_from_str(s, DATE_FORMAT)
                        .map(FieldValue::Date)
                        .map_err(|e| format!("bad date '{s}': {e}"));
                }
                Err(format!("unsupported object {value}"))
            }
            other => Err(format!("unsupported value {other}")),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Decimal(d) => write!(f, "{d}"),
            FieldValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// An ordered set of named fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, FieldValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing any existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!("document is not an object: {value}"));
        };
        let mut doc = Document::new();
        for (name, v) in map {
            doc.insert(name.clone(), FieldValue::from_json(v)?);
        }
        Ok(doc)
    }
}

impl<S: Into<String>> FromIterator<(S, FieldValue)> for Document {
    fn from_iter<I: IntoIterator<Item = (S, FieldValue)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.insert(name, value);
        }
        doc
    }
}

/// Selection used by [`super::DocumentStore::count`].
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    All,
    /// Field value is one of `values`. A missing field compares as `Null`.
    FieldIn { field: String, values: Vec<FieldValue> },
    FieldMissing { field: String },
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            DocumentFilter::All => true,
            DocumentFilter::FieldIn { field, values } => {
                let value = doc.get(field).unwrap_or(&FieldValue::Null);
                values.contains(value)
            }
            DocumentFilter::FieldMissing { field } => !doc.contains_key(field),
        }
    }
}

/// One result row of a grouping query: the composite key and how many
/// documents share it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentGroup {
    pub key: Vec<FieldValue>,
    pub count: u64,
}
