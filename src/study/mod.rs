//! Studies: bounded sequences of trials optimizing one or more objectives
//!
//! A [`Study`] owns the full trial history plus the incrementally maintained
//! best trial (single-objective) or Pareto front (multi-objective). The
//! [`StudyRunner`] drives the propose → validate → evaluate → report →
//! prune → record loop on a bounded worker pool; all history mutation
//! happens on the runner's control thread (single writer), which is what
//! lets the sampler fit its densities against a point-in-time consistent
//! snapshot.

mod runner;

#[cfg(test)]
mod tests;

pub use runner::{StudyHandle, StudyReport, StudyRunner, StudyState, StudyStatus};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::objective::pareto::ParetoFront;
use crate::objective::EvalScope;
use crate::pruner::PrunerConfig;
use crate::sampler::SamplerConfig;
use crate::trial::{Direction, Trial, TrialState};

/// Study-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Trial budget
    pub n_trials: usize,
    /// Worker pool size
    pub max_concurrent_trials: usize,
    /// Study seed; proposals derive per-trial RNGs from it
    pub seed: u64,
    /// Surrogate sampler knobs
    pub sampler: SamplerConfig,
    /// Median pruner knobs
    pub pruner: PrunerConfig,
    /// Per-trial wall-clock budget; exceeded trials are marked failed
    pub trial_timeout: Option<Duration>,
    /// Whole-study wall-clock budget; exceeded studies end cleanly
    pub study_timeout: Option<Duration>,
    /// Consecutive evaluator failures that abort the study
    pub max_consecutive_failures: usize,
    /// Pareto front trim threshold (multi-objective only)
    pub max_front_size: usize,
    /// Backtest window and symbol universe handed to the evaluator
    pub scope: EvalScope,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            n_trials: 100,
            max_concurrent_trials: 4,
            seed: 0,
            sampler: SamplerConfig::default(),
            pruner: PrunerConfig::default(),
            trial_timeout: None,
            study_timeout: None,
            max_consecutive_failures: 10,
            max_front_size: 32,
            scope: EvalScope::default(),
        }
    }
}

/// Per-state trial counts, reported by every status query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCounts {
    pub completed: usize,
    pub pruned: usize,
    pub failed: usize,
    pub running: usize,
}

/// A bounded optimization run over one search space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    /// Stable identifier, the persistence key
    pub id: String,
    /// Optimization direction per objective
    pub directions: Vec<Direction>,
    /// All trials ever created, in proposal order
    pub trials: Vec<Trial>,
    /// ID of the best completed trial (single-objective mode)
    pub best_trial_id: Option<u64>,
    /// Non-dominated front (multi-objective mode)
    pub pareto_front: ParetoFront,
    /// Study seed (persisted so a reloaded study replays proposals)
    pub seed: u64,
}

impl Study {
    /// Create an empty study
    pub fn new(id: impl Into<String>, directions: Vec<Direction>, seed: u64) -> Self {
        let front = ParetoFront::new(directions.clone());
        Self {
            id: id.into(),
            directions,
            trials: Vec::new(),
            best_trial_id: None,
            pareto_front: front,
            seed,
        }
    }

    /// Whether more than one objective is tracked without reduction
    pub fn is_multi_objective(&self) -> bool {
        self.directions.len() > 1
    }

    /// Primary direction (drives the sampler's good/bad split)
    pub fn primary_direction(&self) -> Direction {
        self.directions.first().copied().unwrap_or(Direction::Maximize)
    }

    /// The best completed trial, or `None` when nothing has completed.
    /// Never panics on an empty study.
    pub fn best_trial(&self) -> Option<&Trial> {
        let id = self.best_trial_id?;
        self.trials.iter().find(|t| t.id == id)
    }

    /// Best scalar objective seen so far
    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(Trial::scalar_value)
    }

    /// Look up a trial by ID
    pub fn trial(&self, id: u64) -> Option<&Trial> {
        self.trials.iter().find(|t| t.id == id)
    }

    /// Per-state trial counts
    pub fn counts(&self) -> TrialCounts {
        let mut counts = TrialCounts::default();
        for t in &self.trials {
            match t.state {
                TrialState::Complete => counts.completed += 1,
                TrialState::Pruned => counts.pruned += 1,
                TrialState::Failed => counts.failed += 1,
                TrialState::Running => counts.running += 1,
                TrialState::Pending => {}
            }
        }
        counts
    }

    /// ID for the next trial to propose
    pub fn next_trial_id(&self) -> u64 {
        self.trials.len() as u64
    }

    /// Fold a newly terminal trial into the cached best / front.
    /// Only `Complete` trials are ever eligible.
    pub(crate) fn update_best(&mut self, trial_id: u64) {
        let Some(trial) = self.trials.iter().find(|t| t.id == trial_id) else {
            return;
        };
        if trial.state != TrialState::Complete {
            return;
        }

        if self.is_multi_objective() {
            if let Some(value) = &trial.value {
                let values = value.as_vector();
                self.pareto_front.offer(trial_id, values);
            }
            return;
        }

        let Some(value) = trial.scalar_value() else { return };
        let direction = self.primary_direction();
        let current = self.best_value();
        match current {
            Some(best) if !direction.is_better(value, best) => {}
            _ => self.best_trial_id = Some(trial_id),
        }
    }
}
