//! Field values and caller payloads.
//!
//! # Responsibility
//! - Define the dynamically typed cell value shared by all stores.
//! - Define the `Payload` mapping used by create/update use-cases.
//!
//! # Invariants
//! - `Bool` is persisted as integer `0`/`1`; stores read it back as `Integer`.
//! - Ordering between values follows SQLite affinity rules:
//!   `Null < numbers < text`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Caller-supplied field/value mapping for create and update.
pub type Payload = BTreeMap<String, FieldValue>;

/// One column value of a persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    /// Returns the value in the shape every store persists it in.
    pub fn normalized(&self) -> FieldValue {
        match self {
            Self::Bool(value) => Self::Integer(i64::from(*value)),
            other => other.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Integer `0`/`1` are accepted because booleans round-trip as integers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Integer(0) => Some(false),
            Self::Integer(1) => Some(true),
            _ => None,
        }
    }

    /// Equality as the store evaluates `column = value`.
    pub fn store_eq(&self, other: &FieldValue) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.store_cmp(other) == Ordering::Equal
    }

    /// Total order used for `ORDER BY` evaluation in non-SQL stores.
    pub fn store_cmp(&self, other: &FieldValue) -> Ordering {
        let left = self.normalized();
        let right = other.normalized();
        match (&left, &right) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), _) => Ordering::Greater,
            (_, Self::Text(_)) => Ordering::Less,
            _ => {
                let a = left.as_f64().unwrap_or_default();
                let b = right.as_f64().unwrap_or_default();
                a.total_cmp(&b)
            }
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Builds a [`Payload`] from `(field, value)` pairs.
pub fn payload<K, V, I>(pairs: I) -> Payload
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{payload, FieldValue};
    use std::cmp::Ordering;

    #[test]
    fn bool_normalizes_to_integer() {
        assert_eq!(FieldValue::Bool(true).normalized(), FieldValue::Integer(1));
        assert_eq!(FieldValue::Integer(0).as_bool(), Some(false));
    }

    #[test]
    fn null_never_compares_equal() {
        assert!(!FieldValue::Null.store_eq(&FieldValue::Null));
        assert!(FieldValue::Integer(2).store_eq(&FieldValue::Real(2.0)));
    }

    #[test]
    fn ordering_places_null_before_numbers_before_text() {
        assert_eq!(
            FieldValue::Null.store_cmp(&FieldValue::Integer(-5)),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::Text("a".into()).store_cmp(&FieldValue::Real(9.5)),
            Ordering::Greater
        );
    }

    #[test]
    fn untagged_serde_shape() {
        let fields = payload([("title", FieldValue::from("hi")), ("views", 3i64.into())]);
        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"title":"hi","views":3}"#);

        let parsed: FieldValue = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, FieldValue::Null);
    }
}
