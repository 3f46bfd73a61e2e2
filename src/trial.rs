//! Trials: one evaluation of a single parameter assignment
//!
//! A trial is created when the sampler proposes a set, transitions to
//! `Running` when the backtest starts, and ends in exactly one terminal
//! state. Terminal trials accept no further reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use serde::{Deserialize, Serialize};

use crate::space::ParameterSet;

/// Optimization direction for one objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// Whether `a` is strictly better than `b` in this direction
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match self {
            Direction::Maximize => a > b,
            Direction::Minimize => a < b,
        }
    }

    /// Whether `a` is at least as good as `b` in this direction
    pub fn is_at_least(&self, a: f64, b: f64) -> bool {
        match self {
            Direction::Maximize => a >= b,
            Direction::Minimize => a <= b,
        }
    }
}

/// Final objective of a completed trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectiveValue {
    /// Composite (single-objective) score
    Scalar(f64),
    /// Raw metric vector for Pareto comparison
    Vector(Vec<f64>),
}

impl ObjectiveValue {
    /// Get the scalar value, if single-objective
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ObjectiveValue::Scalar(v) => Some(*v),
            ObjectiveValue::Vector(_) => None,
        }
    }

    /// Get the vector view (a scalar is a 1-vector)
    pub fn as_vector(&self) -> Vec<f64> {
        match self {
            ObjectiveValue::Scalar(v) => vec![*v],
            ObjectiveValue::Vector(v) => v.clone(),
        }
    }
}

/// Trial lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Pending,
    Running,
    Complete,
    Pruned,
    Failed,
}

impl TrialState {
    /// Terminal states accept no further transitions or reports
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialState::Complete | TrialState::Pruned | TrialState::Failed)
    }
}

/// One intermediate objective report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub step: u64,
    pub value: f64,
}

/// One evaluation of a single parameter assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    /// Trial ID, unique within the study
    pub id: u64,
    /// Owning study
    pub study_id: String,
    /// The proposed assignment (frozen at creation)
    pub params: ParameterSet,
    /// Lifecycle state
    pub state: TrialState,
    /// Ordered intermediate reports
    pub reports: Vec<Report>,
    /// Final objective, set on completion (pruned trials carry their last
    /// reported value as a lower-confidence observation)
    pub value: Option<ObjectiveValue>,
}

impl Trial {
    /// Create a pending trial
    pub fn new(id: u64, study_id: impl Into<String>, params: ParameterSet) -> Self {
        Self {
            id,
            study_id: study_id.into(),
            params,
            state: TrialState::Pending,
            reports: Vec::new(),
            value: None,
        }
    }

    /// Mark the trial running
    pub fn start(&mut self) {
        if self.state == TrialState::Pending {
            self.state = TrialState::Running;
        }
    }

    /// Record an intermediate report. Returns false (report dropped) once
    /// the trial is terminal.
    pub fn report(&mut self, step: u64, value: f64) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.reports.push(Report { step, value });
        true
    }

    /// Value reported at a given step, if any
    pub fn report_at(&self, step: u64) -> Option<f64> {
        self.reports.iter().find(|r| r.step == step).map(|r| r.value)
    }

    /// Last intermediate report, if any
    pub fn last_report(&self) -> Option<Report> {
        self.reports.last().copied()
    }

    /// Complete with a final objective. No-op once terminal, like `report`.
    pub fn complete(&mut self, value: ObjectiveValue) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TrialState::Complete;
        self.value = Some(value);
    }

    /// Prune, carrying the last reported value forward. No-op once terminal.
    pub fn prune(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.value = self.last_report().map(|r| ObjectiveValue::Scalar(r.value));
        self.state = TrialState::Pruned;
    }

    /// Mark failed with the sentinel score. No-op once terminal.
    pub fn fail(&mut self, sentinel: f64) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TrialState::Failed;
        self.value = Some(ObjectiveValue::Scalar(sentinel));
    }

    /// Scalar objective of a completed trial
    pub fn scalar_value(&self) -> Option<f64> {
        self.value.as_ref().and_then(ObjectiveValue::as_scalar)
    }
}

/// Handle passed to the evaluation collaborator for one trial.
///
/// Lets a long-running backtest stream intermediate objective values to the
/// study runner and observe cooperative stop requests (prune, cancel,
/// timeout). The evaluator should call [`TrialContext::report`] at each
/// evaluation step and return early when it yields `false`.
#[derive(Debug)]
pub struct TrialContext {
    trial_id: u64,
    reports: Option<mpsc::Sender<(u64, u64, f64)>>,
    stop: Arc<AtomicBool>,
}

impl TrialContext {
    pub(crate) fn new(
        trial_id: u64,
        reports: mpsc::Sender<(u64, u64, f64)>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self { trial_id, reports: Some(reports), stop }
    }

    /// A context with no listener; reports are discarded. For direct
    /// evaluator invocations outside a study.
    pub fn detached() -> Self {
        Self {
            trial_id: 0,
            reports: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The owning trial's ID
    pub fn trial_id(&self) -> u64 {
        self.trial_id
    }

    /// Report an intermediate objective value. Returns `false` when the
    /// runner has requested a stop; the evaluator should return promptly.
    pub fn report(&self, step: u64, value: f64) -> bool {
        if let Some(tx) = &self.reports {
            // A closed channel means the runner is gone; stop.
            if tx.send((self.trial_id, step, value)).is_err() {
                return false;
            }
        }
        !self.is_stopped()
    }

    /// Whether a cooperative stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}
