//! Objective evaluation: backtest metrics in, objective values out
//!
//! Wraps the pluggable backtest collaborator ([`Evaluator`]) and reduces its
//! raw metrics through either the composite-scoring contract
//! ([`CompositeScorer`]) or the Pareto contract ([`VectorObjective`] plus
//! [`pareto`]). Evaluator failures and malformed metrics surface as `Failed`
//! trials carrying the sentinel score; they never abort the study.

mod composite;
mod metrics;
pub mod pareto;

#[cfg(test)]
mod tests;

pub use composite::{CompositeScorer, CompositeWeights, SENTINEL_SCORE};
pub use metrics::{EvalError, EvalScope, Evaluator, MetricKey, RawMetrics};
pub use pareto::{dominates, ParetoFront};

use crate::trial::{Direction, ObjectiveValue};

/// Reduction of raw backtest metrics into the study's objective value(s).
///
/// Implemented by [`CompositeScorer`] (single scalar) and
/// [`VectorObjective`] (metric vector for Pareto comparison).
pub trait Objective: Send + Sync {
    /// Optimization direction per objective component
    fn directions(&self) -> Vec<Direction>;

    /// Reduce raw metrics to the objective value
    fn reduce(&self, metrics: &RawMetrics) -> ObjectiveValue;
}

/// Multi-objective contract: selected metrics returned as a vector with no
/// reduction; non-dominated sorting happens downstream.
#[derive(Debug, Clone)]
pub struct VectorObjective {
    objectives: Vec<(MetricKey, Direction)>,
}

impl VectorObjective {
    /// Build from (metric, direction) pairs
    pub fn new(objectives: Vec<(MetricKey, Direction)>) -> Self {
        Self { objectives }
    }

    /// Common default: maximize return and Sharpe, minimize drawdown
    pub fn return_sharpe_drawdown() -> Self {
        Self::new(vec![
            (MetricKey::TotalReturn, Direction::Maximize),
            (MetricKey::SharpeRatio, Direction::Maximize),
            (MetricKey::MaxDrawdown, Direction::Minimize),
        ])
    }
}

impl Objective for VectorObjective {
    fn directions(&self) -> Vec<Direction> {
        self.objectives.iter().map(|(_, d)| *d).collect()
    }

    fn reduce(&self, metrics: &RawMetrics) -> ObjectiveValue {
        ObjectiveValue::Vector(
            self.objectives
                .iter()
                .map(|(key, _)| metrics.get(key))
                .collect(),
        )
    }
}
