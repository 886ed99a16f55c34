//! Operator attributes: named configuration values attached to one
//! invocation of an operator.
//!
//! Values are a closed set of variants. Operators read them through the typed
//! accessors; the set itself performs no validation beyond key uniqueness.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
}

impl AttrValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Ints(_) => "ints",
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v.into())
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v as f32)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::Ints(v)
    }
}

impl<const N: usize> From<[i64; N]> for AttrValue {
    fn from(v: [i64; N]) -> Self {
        AttrValue::Ints(v.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for AttrValue {
    fn from(v: [i32; N]) -> Self {
        AttrValue::Ints(v.iter().map(|&x| x.into()).collect())
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v:?}"),
            AttrValue::Ints(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Error returned by the typed attribute accessors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AttrError {
    #[error("missing attribute `{key}`")]
    Missing { key: String },

    #[error("attribute `{key}` is {got}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        got: &'static str,
    },
}

/// Named attribute values, keyed by string. Iteration order is by key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, AttrValue>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace an attribute, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    // ── Typed access ────────────────────────────────────────────────────

    pub fn get_int(&self, key: &str) -> Result<i64, AttrError> {
        match self.require(key)? {
            AttrValue::Int(v) => Ok(*v),
            other => Err(type_mismatch(key, "int", other)),
        }
    }

    /// Read a float. Integer values are widened.
    pub fn get_float(&self, key: &str) -> Result<f32, AttrError> {
        match self.require(key)? {
            AttrValue::Float(v) => Ok(*v),
            AttrValue::Int(v) => Ok(*v as f32),
            other => Err(type_mismatch(key, "float", other)),
        }
    }

    /// Read an integer list. A scalar integer reads as a one-element list.
    pub fn get_ints(&self, key: &str) -> Result<Vec<i64>, AttrError> {
        match self.require(key)? {
            AttrValue::Ints(v) => Ok(v.clone()),
            AttrValue::Int(v) => Ok(vec![*v]),
            other => Err(type_mismatch(key, "ints", other)),
        }
    }

    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64, AttrError> {
        if self.contains(key) {
            self.get_int(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_float_or(&self, key: &str, default: f32) -> Result<f32, AttrError> {
        if self.contains(key) {
            self.get_float(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_ints_or(&self, key: &str, default: &[i64]) -> Result<Vec<i64>, AttrError> {
        if self.contains(key) {
            self.get_ints(key)
        } else {
            Ok(default.to_vec())
        }
    }

    fn require(&self, key: &str) -> Result<&AttrValue, AttrError> {
        self.0.get(key).ok_or_else(|| AttrError::Missing { key: key.into() })
    }
}

fn type_mismatch(key: &str, expected: &'static str, got: &AttrValue) -> AttrError {
    AttrError::TypeMismatch {
        key: key.into(),
        expected,
        got: got.type_name(),
    }
}

impl std::fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv_attrs() -> AttributeSet {
        AttributeSet::new()
            .with("padding", [1, 1])
            .with("stride", [2, 2])
            .with("dilation", 2)
            .with("groups", 1)
    }

    #[test]
    fn test_keys_unique_last_write_wins() {
        let mut attrs = AttributeSet::new();
        assert_eq!(attrs.set("axis", 1), None);
        assert_eq!(attrs.set("axis", -1), Some(AttrValue::Int(1)));
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get_int("axis").unwrap(), -1);
    }

    #[test]
    fn test_typed_access() {
        let attrs = conv_attrs();
        assert_eq!(attrs.get_ints("padding").unwrap(), vec![1, 1]);
        assert_eq!(attrs.get_ints("dilation").unwrap(), vec![2]);
        assert_eq!(attrs.get_int("groups").unwrap(), 1);
        assert_eq!(attrs.get_float("groups").unwrap(), 1.0);
    }

    #[test]
    fn test_type_mismatch() {
        let attrs = conv_attrs();
        let err = attrs.get_int("padding").unwrap_err();
        assert_eq!(
            err,
            AttrError::TypeMismatch {
                key: "padding".into(),
                expected: "int",
                got: "ints",
            }
        );
    }

    #[test]
    fn test_missing_and_defaults() {
        let attrs = AttributeSet::new().with("epsilon", 1e-3f32);
        assert!(matches!(attrs.get_int("axis"), Err(AttrError::Missing { .. })));
        assert_eq!(attrs.get_int_or("axis", -1).unwrap(), -1);
        assert_eq!(attrs.get_float_or("epsilon", 1e-5).unwrap(), 1e-3);
        assert!(attrs.get_ints_or("epsilon", &[0, 0]).is_err());
    }

    #[test]
    fn test_display_sorted_by_key() {
        assert_eq!(
            conv_attrs().to_string(),
            "{dilation=2, groups=1, padding=[1, 1], stride=[2, 2]}"
        );
        assert_eq!(AttributeSet::new().to_string(), "{}");
    }
}
