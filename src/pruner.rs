//! Median pruner: early termination of unpromising backtests
//!
//! # Toyota Way: Muda (Waste Elimination)
//!
//! A trial trailing the population median at the same evaluation step is a
//! poor use of a full backtest; stop it and spend the worker on a better
//! candidate. Pruned trials end as `Pruned`, never `Failed`; their last
//! reported value stays in sampler history as a lower-confidence
//! observation.
//!
//! Two guards prevent premature kills: the study must have completed
//! `n_startup_trials` (a meaningful comparison population), and the trial
//! itself must have reported `n_warmup_steps` (slow starters get a chance).
//! Comparisons only ever use trials that themselves reached step *k*, never
//! future information.

use serde::{Deserialize, Serialize};

use crate::trial::{Direction, Trial, TrialState};

/// Median-pruning policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunerConfig {
    /// Completed trials required before any pruning happens
    pub n_startup_trials: usize,
    /// Reports a trial must have made before it may be pruned
    pub n_warmup_steps: usize,
    /// Absolute margin the trial must trail the median by
    pub margin: f64,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self { n_startup_trials: 5, n_warmup_steps: 3, margin: 0.0 }
    }
}

/// Compares a running trial's intermediate value against the median of the
/// population at the same step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedianPruner {
    config: PrunerConfig,
}

impl MedianPruner {
    /// Create a pruner with the given policy
    pub fn new(config: PrunerConfig) -> Self {
        Self { config }
    }

    /// Decide whether `trial` should be pruned after reporting `value` at
    /// `step`. `history` is the study's full trial list (the trial's own
    /// entry is excluded by ID).
    pub fn should_prune(
        &self,
        trial: &Trial,
        step: u64,
        value: f64,
        history: &[Trial],
        direction: Direction,
    ) -> bool {
        let completed = history
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .count();
        if completed < self.config.n_startup_trials {
            return false;
        }
        if trial.reports.len() < self.config.n_warmup_steps {
            return false;
        }

        // Only peers that themselves reached step k
        let mut peers: Vec<f64> = history
            .iter()
            .filter(|t| t.id != trial.id)
            .filter_map(|t| t.report_at(step))
            .collect();
        if peers.is_empty() {
            return false;
        }

        peers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if peers.len() % 2 == 1 {
            peers[peers.len() / 2]
        } else {
            (peers[peers.len() / 2 - 1] + peers[peers.len() / 2]) / 2.0
        };

        match direction {
            Direction::Maximize => value < median - self.config.margin,
            Direction::Minimize => value > median + self.config.margin,
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::space::ParameterSet;
    use crate::trial::ObjectiveValue;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_startup_guard_holds(n_startup in 1usize..20, n_completed in 0usize..20) {
            let pruner = MedianPruner::new(PrunerConfig {
                n_startup_trials: n_startup,
                n_warmup_steps: 1,
                margin: 0.0,
            });
            let history: Vec<Trial> = (0..n_completed as u64)
                .map(|id| {
                    let mut t = Trial::new(id, "s1", ParameterSet::new());
                    t.start();
                    t.report(1, 0.5);
                    t.complete(ObjectiveValue::Scalar(0.5));
                    t
                })
                .collect();

            let mut candidate = Trial::new(999, "s1", ParameterSet::new());
            candidate.start();
            candidate.report(1, -1000.0);

            let decision =
                pruner.should_prune(&candidate, 1, -1000.0, &history, Direction::Maximize);
            if n_completed < n_startup {
                prop_assert!(!decision);
            }
        }
    }
}
