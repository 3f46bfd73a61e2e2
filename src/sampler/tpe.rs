//! TPE sampler core

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::space::{ParamDomain, ParamValue, ParameterSet, SearchSpace};
use crate::trial::{Direction, ObjectiveValue, Trial, TrialState};

use super::sampling::{continuous_candidates, indexed_candidates, pick_best};

/// Ratio differences below this count as a tie and fall through to the
/// exploration tie-break.
const TIE_EPS: f64 = 1e-9;

/// Sampler tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Quantile of completed trials treated as "good" (top fraction)
    pub gamma: f64,
    /// Proposals drawn uniformly from the prior before the surrogate engages
    pub n_startup_trials: usize,
    /// Candidate batch size per parameter
    pub n_candidates: usize,
    /// KDE bandwidth scale (bandwidth = scale * range / 10)
    pub kde_bandwidth: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            gamma: 0.25,
            n_startup_trials: 20,
            n_candidates: 24,
            kde_bandwidth: 1.0,
        }
    }
}

/// Density-ratio surrogate sampler.
///
/// Stateless over trial history: the study runner passes a consistent
/// snapshot into each [`propose`](TpeSampler::propose) call. Holds only its
/// configuration and the study seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpeSampler {
    config: SamplerConfig,
    seed: u64,
}

impl TpeSampler {
    /// Create a sampler with default configuration
    pub fn new(seed: u64) -> Self {
        Self { config: SamplerConfig::default(), seed }
    }

    /// Create a sampler with explicit configuration
    pub fn with_config(seed: u64, config: SamplerConfig) -> Self {
        let mut config = config;
        config.gamma = config.gamma.clamp(0.01, 0.99);
        config.n_startup_trials = config.n_startup_trials.max(1);
        config.n_candidates = config.n_candidates.max(1);
        Self { config, seed }
    }

    /// The configured startup-trial count
    pub fn n_startup_trials(&self) -> usize {
        self.config.n_startup_trials
    }

    /// Propose the assignment for trial `trial_index`.
    ///
    /// The first `n_startup_trials` proposals come from the uniform prior
    /// regardless of history (cold start); the surrogate also falls back to
    /// the prior whenever no completed trials exist. Deterministic given
    /// `(seed, trial_index, history)`.
    pub fn propose(
        &self,
        trial_index: u64,
        space: &SearchSpace,
        history: &[Trial],
        direction: Direction,
    ) -> ParameterSet {
        let mut rng = StdRng::seed_from_u64(splitmix64(
            self.seed ^ trial_index.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        ));

        let completed: Vec<&Trial> = history
            .iter()
            .filter(|t| t.state == TrialState::Complete && t.value.is_some())
            .collect();

        if (trial_index as usize) < self.config.n_startup_trials || completed.is_empty() {
            return space.sample_random(&mut rng);
        }

        // Split completed trials at the gamma quantile, best first.
        let mut sorted = completed;
        sorted.sort_by(|a, b| {
            let (va, vb) = (split_value(a), split_value(b));
            match direction {
                Direction::Maximize => vb.partial_cmp(&va),
                Direction::Minimize => va.partial_cmp(&vb),
            }
            .unwrap_or(std::cmp::Ordering::Equal)
        });
        let n_good = ((sorted.len() as f64) * self.config.gamma).ceil() as usize;
        let n_good = n_good.clamp(1, (sorted.len() - 1).max(1));
        let (good, rest) = sorted.split_at(n_good.min(sorted.len()));

        // Pruned trials join the bad side only: their last reported value is
        // a lower-confidence observation, never evidence of a good region.
        let mut bad: Vec<&Trial> = rest.to_vec();
        bad.extend(
            history
                .iter()
                .filter(|t| t.state == TrialState::Pruned && t.value.is_some()),
        );

        let mut set = ParameterSet::new();
        for (name, domain) in space.iter() {
            let value = self.sample_parameter(name, domain, good, &bad, history, &mut rng);
            set.insert(name.clone(), value);
        }
        set
    }

    fn sample_parameter<R: Rng>(
        &self,
        name: &str,
        domain: &ParamDomain,
        good: &[&Trial],
        bad: &[&Trial],
        history: &[Trial],
        rng: &mut R,
    ) -> ParamValue {
        // Normalized values of every previously evaluated point, for the
        // exploration tie-break.
        let seen: Vec<f64> = history
            .iter()
            .filter_map(|t| t.params.get(name))
            .filter_map(|v| domain.normalize(v))
            .collect();
        let min_dist = |candidate_norm: f64| -> f64 {
            seen.iter()
                .map(|s| (s - candidate_norm).abs())
                .fold(f64::INFINITY, f64::min)
                .min(1.0)
        };

        match domain {
            ParamDomain::Real { low, high, log_scale } => {
                let transform = |v: f64| if *log_scale { v.max(f64::MIN_POSITIVE).ln() } else { v };
                let good_values: Vec<f64> = float_values(good, name, transform);
                let bad_values: Vec<f64> = float_values(bad, name, transform);
                let (lo, hi) = if *log_scale {
                    (low.max(f64::MIN_POSITIVE).ln(), high.max(f64::MIN_POSITIVE).ln())
                } else {
                    (*low, *high)
                };

                let candidates = continuous_candidates(
                    &good_values,
                    &bad_values,
                    lo,
                    hi,
                    self.config.kde_bandwidth,
                    self.config.n_candidates,
                    rng,
                );
                let pairs: Vec<(f64, f64)> =
                    candidates.iter().map(|c| (c.value, c.ratio)).collect();
                let picked = pick_best(&pairs, TIE_EPS, |v| {
                    let raw = if *log_scale { v.exp() } else { v };
                    domain
                        .normalize(&ParamValue::Float(raw))
                        .map_or(0.0, &min_dist)
                })
                .unwrap_or(lo);
                let raw = if *log_scale { picked.exp() } else { picked };
                ParamValue::Float(raw.clamp(*low, *high))
            }
            ParamDomain::Integer { low, high, step } => {
                let step = (*step).max(1);
                let n_bins = (((high - low) / step) + 1) as usize;
                let to_index = |v: i64| ((v - low) / step) as usize;
                let good_idx: Vec<usize> = int_values(good, name).into_iter().map(to_index).collect();
                let bad_idx: Vec<usize> = int_values(bad, name).into_iter().map(to_index).collect();

                let candidates = indexed_candidates(
                    &good_idx,
                    &bad_idx,
                    n_bins,
                    self.config.n_candidates,
                    rng,
                );
                let pairs: Vec<(f64, f64)> = candidates
                    .iter()
                    .map(|&(i, r)| (i as f64, r))
                    .collect();
                let picked = pick_best(&pairs, TIE_EPS, |i| {
                    let v = low + (i as i64) * step;
                    domain.normalize(&ParamValue::Int(v)).map_or(0.0, &min_dist)
                })
                .unwrap_or(0.0) as i64;
                ParamValue::Int((low + picked * step).min(*high))
            }
            ParamDomain::Categorical { choices } => {
                let to_index = |s: &str| choices.iter().position(|c| c == s);
                let good_idx: Vec<usize> = str_values(good, name)
                    .into_iter()
                    .filter_map(|s| to_index(&s))
                    .collect();
                let bad_idx: Vec<usize> = str_values(bad, name)
                    .into_iter()
                    .filter_map(|s| to_index(&s))
                    .collect();

                let candidates = indexed_candidates(
                    &good_idx,
                    &bad_idx,
                    choices.len(),
                    self.config.n_candidates,
                    rng,
                );
                let pairs: Vec<(f64, f64)> = candidates
                    .iter()
                    .map(|&(i, r)| (i as f64, r))
                    .collect();
                let picked = pick_best(&pairs, TIE_EPS, |i| {
                    let choice = &choices[(i as usize).min(choices.len() - 1)];
                    domain
                        .normalize(&ParamValue::Categorical(choice.clone()))
                        .map_or(0.0, &min_dist)
                })
                .unwrap_or(0.0) as usize;
                ParamValue::Categorical(choices[picked.min(choices.len() - 1)].clone())
            }
        }
    }
}

/// Objective used for the good/bad split: the scalar score, or the first
/// component of a multi-objective vector.
fn split_value(trial: &Trial) -> f64 {
    match &trial.value {
        Some(ObjectiveValue::Scalar(v)) => *v,
        Some(ObjectiveValue::Vector(v)) => v.first().copied().unwrap_or(f64::NAN),
        None => f64::NAN,
    }
}

fn float_values<F: Fn(f64) -> f64>(trials: &[&Trial], name: &str, transform: F) -> Vec<f64> {
    trials
        .iter()
        .filter_map(|t| t.params.get(name)?.as_float())
        .map(transform)
        .collect()
}

fn int_values(trials: &[&Trial], name: &str) -> Vec<i64> {
    trials
        .iter()
        .filter_map(|t| t.params.get(name)?.as_int())
        .collect()
}

fn str_values(trials: &[&Trial], name: &str) -> Vec<String> {
    trials
        .iter()
        .filter_map(|t| t.params.get(name)?.as_str().map(str::to_string))
        .collect()
}

/// SplitMix64 finalizer; decorrelates per-trial seeds
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
