//! Parameter values and assignments

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A concrete parameter value sampled from a domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Categorical(String),
}

impl ParamValue {
    /// Get as float (converts int to float if needed)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Categorical(_) => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) => Some(*v as i64),
            ParamValue::Categorical(_) => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Categorical(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Categorical(s) => write!(f, "{s}"),
        }
    }
}

/// A complete parameter assignment, one value per registered parameter.
///
/// Backed by a `BTreeMap` so iteration order is deterministic; proposal
/// replay and study resume depend on it. Never mutated after proposal;
/// the sampler builds a fresh set each time (copy-on-propose).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value (builder-phase only; sets are frozen after proposal)
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    /// Get a value by name
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Get a float value by name
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(ParamValue::as_float)
    }

    /// Get an int value by name
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(ParamValue::as_int)
    }

    /// Get a categorical value by name
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(ParamValue::as_str)
    }

    /// Iterate in deterministic (name) order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Parameter names in deterministic order
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of assigned parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ParamValue)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
