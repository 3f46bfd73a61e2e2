//! The parameter space registry

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::ParamDomain;
use super::value::{ParamValue, ParameterSet};

/// Registry validation failures.
///
/// Raised before a trial is ever created; a set that fails validation is
/// never retried automatically.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpaceError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid value for {name}: {value} (expected {expected})")]
    OutOfBounds {
        name: String,
        value: String,
        expected: String,
    },

    #[error("empty search space")]
    EmptySpace,
}

/// Declares every tunable parameter's domain, plus optional grouping by
/// owning subsystem (momentum, order-flow, risk, ...).
///
/// Grouping exists purely for reporting and for scoping studies to a
/// subsystem; validation is always flat over the full key space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Parameter name -> domain (BTreeMap: deterministic iteration order)
    params: BTreeMap<String, ParamDomain>,
    /// Group name -> member parameter names
    groups: BTreeMap<String, Vec<String>>,
}

impl SearchSpace {
    /// Create an empty space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn add(&mut self, name: &str, domain: ParamDomain) {
        self.params.insert(name.to_string(), domain);
    }

    /// Add a parameter under a named group
    pub fn add_grouped(&mut self, name: &str, group: &str, domain: ParamDomain) {
        self.add(name, domain);
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(name.to_string());
    }

    /// Get a parameter domain
    pub fn get(&self, name: &str) -> Option<&ParamDomain> {
        self.params.get(name)
    }

    /// Member names of a group
    pub fn group(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// All group names
    pub fn group_names(&self) -> impl Iterator<Item = &String> {
        self.groups.keys()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the space has no parameters
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate parameters in deterministic (name) order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamDomain)> {
        self.params.iter()
    }

    /// A scoped copy containing only the named parameters.
    ///
    /// Used by the trigger controller's conservative and regime-scoped
    /// strategies. Unknown names are ignored; group membership is retained
    /// for surviving parameters.
    pub fn subset(&self, names: &[&str]) -> SearchSpace {
        let params: BTreeMap<String, ParamDomain> = names
            .iter()
            .filter_map(|n| self.params.get(*n).map(|d| (n.to_string(), d.clone())))
            .collect();
        let groups = self
            .groups
            .iter()
            .filter_map(|(g, members)| {
                let kept: Vec<String> = members
                    .iter()
                    .filter(|m| params.contains_key(*m))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then(|| (g.clone(), kept))
            })
            .collect();
        SearchSpace { params, groups }
    }

    /// A scoped copy containing only the members of a group
    pub fn group_subset(&self, group: &str) -> SearchSpace {
        match self.groups.get(group) {
            Some(members) => {
                let names: Vec<&str> = members.iter().map(String::as_str).collect();
                self.subset(&names)
            }
            None => SearchSpace::new(),
        }
    }

    /// Sample a uniform random assignment (the cold-start prior)
    pub fn sample_random<R: Rng>(&self, rng: &mut R) -> ParameterSet {
        self.params
            .iter()
            .map(|(name, domain)| (name.clone(), domain.sample(rng)))
            .collect()
    }

    /// Validate an assignment against the full key space.
    ///
    /// Rejects unknown keys, missing keys, out-of-bounds numerics, and
    /// choices outside the declared categorical set.
    pub fn validate(&self, set: &ParameterSet) -> super::Result<()> {
        for name in set.names() {
            if !self.params.contains_key(name) {
                return Err(SpaceError::UnknownParameter(name.clone()));
            }
        }
        for (name, domain) in &self.params {
            match set.get(name) {
                Some(value) if domain.contains(value) => {}
                Some(value) => {
                    return Err(SpaceError::OutOfBounds {
                        name: name.clone(),
                        value: value.to_string(),
                        expected: domain.describe(),
                    })
                }
                None => return Err(SpaceError::MissingParameter(name.clone())),
            }
        }
        Ok(())
    }

    /// Normalized euclidean distance between two assignments over this
    /// space. Parameters that fail to normalize contribute nothing.
    pub fn distance(&self, a: &ParameterSet, b: &ParameterSet) -> f64 {
        let mut sum = 0.0;
        for (name, domain) in &self.params {
            if let (Some(va), Some(vb)) = (a.get(name), b.get(name)) {
                if let (Some(na), Some(nb)) = (domain.normalize(va), domain.normalize(vb)) {
                    sum += (na - nb).powi(2);
                }
            }
        }
        sum.sqrt()
    }
}

/// Convenience constructor for `ParamValue` from common literals
impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Categorical(v.to_string())
    }
}
