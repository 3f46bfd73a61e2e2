//! Deployment safety gate
//!
//! An optimization winning a study is not automatically fit for live
//! trading. The gate checks a candidate parameter set against the current
//! baseline before it may be marked deployable: bounded per-parameter
//! change, minimum evidence (completed trials), minimum improvement,
//! stability of the top trials around the candidate, and an optional human
//! approval hold. Accepted candidates become [`DeploymentRecord`]s in an
//! append-only log that supports multi-step rollback.
//!
//! # Toyota Way: Jidoka
//!
//! The gate stops the line instead of shipping a suspect change. Every
//! rejection names the failing check and the offending parameters, so the
//! operator can act on it rather than guess.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::space::{ParamValue, ParameterSet, SearchSpace};
use crate::study::Study;
use crate::trial::{Direction, TrialState};

/// Thresholds a candidate must clear before deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// Maximum per-parameter relative change versus the baseline, in
    /// percent. A categorical change always counts as 100.
    pub max_change_percent: f64,
    /// Minimum completed trials in the study backing the candidate
    pub min_trials_for_deployment: usize,
    /// Minimum relative improvement over the baseline score, in percent
    pub min_improvement_percent: f64,
    /// Minimum fraction of top-decile trials clustered near the candidate
    pub min_stability_score: f64,
    /// Hold every candidate until an operator approves the study
    pub requires_human_approval: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            max_change_percent: 50.0,
            min_trials_for_deployment: 50,
            min_improvement_percent: 2.0,
            min_stability_score: 0.5,
            requires_human_approval: false,
        }
    }
}

/// A rejected deployment, naming the check that failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SafetyRejection {
    #[error(
        "parameter {name} changes {change_percent:.1}% (limit {limit_percent:.1}%)"
    )]
    ParameterChangeExceeded {
        name: String,
        change_percent: f64,
        limit_percent: f64,
    },

    #[error("study completed {completed} trials, {required} required for deployment")]
    InsufficientTrials { completed: usize, required: usize },

    #[error(
        "improvement {improvement_percent:.2}% below required {required_percent:.2}%"
    )]
    InsufficientImprovement {
        improvement_percent: f64,
        required_percent: f64,
    },

    #[error("stability {stability:.2} below required {required:.2}")]
    Unstable { stability: f64, required: f64 },

    #[error("deployment of study {study_id} pending human approval")]
    PendingApproval { study_id: String },
}

/// A candidate that cleared every check and may be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployable {
    pub study_id: String,
    pub params: ParameterSet,
    pub score: f64,
    pub baseline_score: f64,
}

impl Deployable {
    /// Freeze into a log record superseding `previous`
    pub fn into_record(self, previous: Option<ParameterSet>) -> DeploymentRecord {
        DeploymentRecord {
            study_id: self.study_id,
            params: self.params,
            timestamp: Utc::now(),
            previous,
        }
    }
}

/// One deployed parameter set and what it superseded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub study_id: String,
    pub params: ParameterSet,
    pub timestamp: DateTime<Utc>,
    /// Parameters in force before this deployment; rollback restores them
    pub previous: Option<ParameterSet>,
}

/// Side of the gate that touches the live system
pub trait Deployer {
    /// Put a record's parameters into effect
    fn apply(&mut self, record: &DeploymentRecord) -> Result<(), DeployError>;

    /// Undo a record, restoring its `previous` parameters
    fn rollback(&mut self, record: &DeploymentRecord) -> Result<(), DeployError>;
}

/// Failure applying or rolling back a deployment
#[derive(Debug, Clone, thiserror::Error)]
#[error("deployment failed: {0}")]
pub struct DeployError(pub String);

/// Normalized neighborhood radius for the stability check
const STABILITY_RADIUS: f64 = 0.1;

/// The gate itself: stateless checks plus the set of operator approvals
#[derive(Debug, Default)]
pub struct SafetyGate {
    policy: SafetyPolicy,
    approved: HashSet<String>,
}

impl SafetyGate {
    pub fn new(policy: SafetyPolicy) -> Self {
        Self {
            policy,
            approved: HashSet::new(),
        }
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Record operator approval for a study's candidate
    pub fn approve(&mut self, study_id: impl Into<String>) {
        self.approved.insert(study_id.into());
    }

    /// Check the study's best parameters against the baseline.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// per-parameter change, trial count, improvement, stability, then the
    /// human-approval hold. The check is deterministic and idempotent; it
    /// never mutates the study or the gate.
    pub fn evaluate(
        &self,
        study: &Study,
        space: &SearchSpace,
        baseline: &ParameterSet,
        baseline_score: f64,
    ) -> Result<Deployable, SafetyRejection> {
        let completed = study.counts().completed;
        let candidate = match study.best_trial() {
            Some(t) => t,
            None => {
                return Err(SafetyRejection::InsufficientTrials {
                    completed,
                    required: self.policy.min_trials_for_deployment,
                })
            }
        };
        let candidate_score = candidate.scalar_value().unwrap_or(f64::NEG_INFINITY);

        self.check_parameter_changes(&candidate.params, baseline)?;

        if completed < self.policy.min_trials_for_deployment {
            return Err(SafetyRejection::InsufficientTrials {
                completed,
                required: self.policy.min_trials_for_deployment,
            });
        }

        let improvement_percent = relative_improvement(candidate_score, baseline_score);
        if improvement_percent < self.policy.min_improvement_percent {
            return Err(SafetyRejection::InsufficientImprovement {
                improvement_percent,
                required_percent: self.policy.min_improvement_percent,
            });
        }

        let stability = stability_score(study, space, &candidate.params);
        if stability < self.policy.min_stability_score {
            return Err(SafetyRejection::Unstable {
                stability,
                required: self.policy.min_stability_score,
            });
        }

        if self.policy.requires_human_approval && !self.approved.contains(&study.id) {
            return Err(SafetyRejection::PendingApproval {
                study_id: study.id.clone(),
            });
        }

        Ok(Deployable {
            study_id: study.id.clone(),
            params: candidate.params.clone(),
            score: candidate_score,
            baseline_score,
        })
    }

    fn check_parameter_changes(
        &self,
        candidate: &ParameterSet,
        baseline: &ParameterSet,
    ) -> Result<(), SafetyRejection> {
        for (name, cand) in candidate.iter() {
            let change_percent = match baseline.get(name) {
                Some(base) => change_percent(cand, base),
                // A parameter the baseline never had is a full swap
                None => 100.0,
            };
            if change_percent > self.policy.max_change_percent {
                return Err(SafetyRejection::ParameterChangeExceeded {
                    name: name.clone(),
                    change_percent,
                    limit_percent: self.policy.max_change_percent,
                });
            }
        }
        Ok(())
    }
}

/// Relative change of one value against its baseline, in percent
fn change_percent(candidate: &ParamValue, baseline: &ParamValue) -> f64 {
    match (candidate, baseline) {
        (ParamValue::Categorical(c), ParamValue::Categorical(b)) => {
            if c == b {
                0.0
            } else {
                100.0
            }
        }
        _ => match (candidate.as_float(), baseline.as_float()) {
            (Some(c), Some(b)) => {
                if (c - b).abs() < f64::EPSILON {
                    0.0
                } else if b.abs() < f64::EPSILON {
                    f64::INFINITY
                } else {
                    (c - b).abs() / b.abs() * 100.0
                }
            }
            // Type mismatch between candidate and baseline is a full swap
            _ => 100.0,
        },
    }
}

fn relative_improvement(candidate: f64, baseline: f64) -> f64 {
    if baseline.abs() < f64::EPSILON {
        if candidate > baseline {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }
    } else {
        (candidate - baseline) / baseline.abs() * 100.0
    }
}

/// Fraction of top-decile completed trials whose parameters lie within the
/// normalized neighborhood of the candidate. A lone top trial (the candidate
/// itself) scores 1.0; a scattered top decile scores near zero.
fn stability_score(study: &Study, space: &SearchSpace, candidate: &ParameterSet) -> f64 {
    let direction = study.primary_direction();
    let mut scored: Vec<(&ParameterSet, f64)> = study
        .trials
        .iter()
        .filter(|t| t.state == TrialState::Complete)
        .filter_map(|t| t.scalar_value().map(|v| (&t.params, v)))
        .collect();
    if scored.is_empty() {
        return 0.0;
    }
    scored.sort_by(|a, b| match direction {
        Direction::Maximize => b.1.total_cmp(&a.1),
        Direction::Minimize => a.1.total_cmp(&b.1),
    });
    let top_n = (scored.len() / 10).max(1);
    let dims = space.len().max(1) as f64;
    let near = scored[..top_n]
        .iter()
        .filter(|(params, _)| space.distance(params, candidate) / dims.sqrt() <= STABILITY_RADIUS)
        .count();
    near as f64 / top_n as f64
}

/// Append-only deployment history with the full supersession chain
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DeploymentLog {
    records: Vec<DeploymentRecord>,
}

impl DeploymentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters currently in force
    pub fn current(&self) -> Option<&DeploymentRecord> {
        self.records.last()
    }

    pub fn records(&self) -> &[DeploymentRecord] {
        &self.records
    }

    /// Apply an accepted candidate and append it to the log
    pub fn deploy(
        &mut self,
        deployable: Deployable,
        deployer: &mut dyn Deployer,
    ) -> Result<DeploymentRecord, DeployError> {
        let previous = self.current().map(|r| r.params.clone());
        let record = deployable.into_record(previous);
        deployer.apply(&record)?;
        self.records.push(record.clone());
        Ok(record)
    }

    /// Restore the parameters the latest deployment superseded. The
    /// restoration is itself appended, so repeated rollbacks walk the chain
    /// backwards one step at a time.
    pub fn rollback(&mut self, deployer: &mut dyn Deployer) -> Result<DeploymentRecord, DeployError> {
        let last = self
            .current()
            .ok_or_else(|| DeployError("nothing deployed".to_string()))?
            .clone();
        let restored = last
            .previous
            .clone()
            .ok_or_else(|| DeployError("no previous parameters to restore".to_string()))?;
        deployer.rollback(&last)?;
        // Inherit the supersession link of the deployment being restored,
        // so repeated rollbacks keep walking backwards
        let prior = self
            .records
            .iter()
            .rev()
            .skip(1)
            .find(|r| r.params == restored)
            .and_then(|r| r.previous.clone());
        let record = DeploymentRecord {
            study_id: last.study_id,
            params: restored,
            timestamp: Utc::now(),
            previous: prior,
        };
        self.records.push(record.clone());
        Ok(record)
    }
}
