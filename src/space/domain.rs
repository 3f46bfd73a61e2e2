//! Tagged parameter domains

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::value::ParamValue;

/// The domain a parameter may be sampled from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamDomain {
    /// Continuous range [low, high], optionally log-scaled
    Real { low: f64, high: f64, log_scale: bool },
    /// Integer range [low, high] with a stride (step >= 1)
    Integer { low: i64, high: i64, step: i64 },
    /// Ordered categorical choices
    Categorical { choices: Vec<String> },
}

impl ParamDomain {
    /// Shorthand for a linear real range
    pub fn real(low: f64, high: f64) -> Self {
        ParamDomain::Real { low, high, log_scale: false }
    }

    /// Shorthand for a unit-stride integer range
    pub fn int(low: i64, high: i64) -> Self {
        ParamDomain::Integer { low, high, step: 1 }
    }

    /// Sample a uniform random value from this domain (the cold-start prior)
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match self {
            ParamDomain::Real { low, high, log_scale } => {
                let value = if *log_scale {
                    let log_low = low.max(f64::MIN_POSITIVE).ln();
                    let log_high = high.max(f64::MIN_POSITIVE).ln();
                    (log_low + rng.random::<f64>() * (log_high - log_low)).exp()
                } else {
                    low + rng.random::<f64>() * (high - low)
                };
                ParamValue::Float(value)
            }
            ParamDomain::Integer { low, high, step } => {
                let step = (*step).max(1);
                let n_steps = (high - low) / step + 1;
                let offset = (rng.random::<f64>() * n_steps as f64).floor() as i64;
                let value = (low + offset.min(n_steps - 1) * step).min(*high);
                ParamValue::Int(value)
            }
            ParamDomain::Categorical { choices } => {
                let idx = (rng.random::<f64>() * choices.len() as f64).floor() as usize;
                let idx = idx.min(choices.len().saturating_sub(1));
                ParamValue::Categorical(choices[idx].clone())
            }
        }
    }

    /// Check if a value is valid for this domain
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParamDomain::Real { low, high, .. }, ParamValue::Float(v)) => {
                *v >= *low && *v <= *high
            }
            (ParamDomain::Integer { low, high, step }, ParamValue::Int(v)) => {
                *v >= *low && *v <= *high && (*v - *low) % (*step).max(1) == 0
            }
            (ParamDomain::Categorical { choices }, ParamValue::Categorical(s)) => {
                choices.contains(s)
            }
            _ => false,
        }
    }

    /// Map a value into [0, 1] within this domain.
    ///
    /// Used for the sampler's exploration tie-break and the safety gate's
    /// stability clustering, so distances are comparable across
    /// heterogeneous parameters. Returns `None` for type mismatches.
    pub fn normalize(&self, value: &ParamValue) -> Option<f64> {
        match (self, value) {
            (ParamDomain::Real { low, high, log_scale }, ParamValue::Float(v)) => {
                if *log_scale {
                    let lo = low.max(f64::MIN_POSITIVE).ln();
                    let hi = high.max(f64::MIN_POSITIVE).ln();
                    let x = v.max(f64::MIN_POSITIVE).ln();
                    Some(((x - lo) / (hi - lo).max(f64::MIN_POSITIVE)).clamp(0.0, 1.0))
                } else {
                    let span = high - low;
                    if span <= 0.0 {
                        return Some(0.5);
                    }
                    Some(((v - low) / span).clamp(0.0, 1.0))
                }
            }
            (ParamDomain::Integer { low, high, .. }, ParamValue::Int(v)) => {
                let span = (high - low) as f64;
                if span <= 0.0 {
                    return Some(0.5);
                }
                Some((((*v - *low) as f64) / span).clamp(0.0, 1.0))
            }
            (ParamDomain::Categorical { choices }, ParamValue::Categorical(s)) => {
                let idx = choices.iter().position(|c| c == s)?;
                if choices.len() < 2 {
                    return Some(0.5);
                }
                Some(idx as f64 / (choices.len() - 1) as f64)
            }
            _ => None,
        }
    }

    /// Human-readable bounds, for rejection messages
    pub fn describe(&self) -> String {
        match self {
            ParamDomain::Real { low, high, log_scale } => {
                if *log_scale {
                    format!("real in [{low}, {high}] (log scale)")
                } else {
                    format!("real in [{low}, {high}]")
                }
            }
            ParamDomain::Integer { low, high, step } => {
                format!("integer in [{low}, {high}] step {step}")
            }
            ParamDomain::Categorical { choices } => {
                format!("one of {{{}}}", choices.join(", "))
            }
        }
    }
}
