//! Operational facts describing one flight plan.
//!
//! A [`FactMap`] maps a field name (`airspace`, `altitude`, `m1`, ...) to a
//! [`FactValue`]. It is produced once per request by [`normalize`] and is
//! immutable afterwards; every downstream stage only reads it.
//!
//! - **schema.rs**: declared fields, kinds, ranges and categorical vocabularies
//! - **normalize.rs**: unit conversion, derived values, case folding, aliasing, defaults

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod normalize;
pub mod schema;

pub use normalize::{normalize, Alias, NormalizationConfig, UnitConversion};
pub use schema::{FactKind, FactSchema, FieldSpec};

/// A single fact value.
///
/// Deserializes untagged, so JSON `true`, `150` and `"G"` map directly onto
/// `Flag`, `Number` and `Category`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Flag(bool),
    Number(f64),
    Category(String),
}

impl FactValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Category(s) => Some(s),
            _ => None,
        }
    }

    /// Short kind name used in validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Flag(_) => "flag",
            Self::Number(_) => "number",
            Self::Category(_) => "category",
        }
    }

    /// Key used when a fact selects a fallback bucket.
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Category(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<f64> for FactValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FactValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        Self::Category(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        Self::Category(value)
    }
}

/// Field name to value mapping. Ordered so traces and output are stable.
pub type FactMap = BTreeMap<String, FactValue>;

/// Build a [`FactMap`] from `(name, value)` pairs.
///
/// ```rust
/// use soracalc::facts::{fact_map, FactValue};
///
/// let facts = fact_map([("airspace", FactValue::from("G")), ("altitude", 50.into())]);
/// assert_eq!(facts["altitude"].as_number(), Some(50.0));
/// ```
pub fn fact_map<K, I>(entries: I) -> FactMap
where
    K: Into<String>,
    I: IntoIterator<Item = (K, FactValue)>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
