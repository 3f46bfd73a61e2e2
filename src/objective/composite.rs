//! Composite (single-objective) scoring

use serde::{Deserialize, Serialize};

use crate::trial::{Direction, ObjectiveValue};

use super::metrics::RawMetrics;
use super::Objective;

/// Score assigned to failed or statistically unreliable trials. Far below
/// any reachable composite score, so such trials sink to the bottom of
/// every ranking.
pub const SENTINEL_SCORE: f64 = -999.0;

/// Component weights of the composite score.
///
/// Re-normalized to sum exactly 1.0 when the scorer is built, so callers
/// may express relative importance in any scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub activity: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            total_return: 0.30,
            sharpe_ratio: 0.25,
            max_drawdown: 0.20,
            win_rate: 0.15,
            activity: 0.10,
        }
    }
}

impl CompositeWeights {
    fn sum(&self) -> f64 {
        self.total_return + self.sharpe_ratio + self.max_drawdown + self.win_rate + self.activity
    }

    fn normalized(self) -> Self {
        let s = self.sum();
        if s <= 0.0 || !s.is_finite() {
            return Self::default();
        }
        Self {
            total_return: self.total_return / s,
            sharpe_ratio: self.sharpe_ratio / s,
            max_drawdown: self.max_drawdown / s,
            win_rate: self.win_rate / s,
            activity: self.activity / s,
        }
    }
}

/// Reduces raw backtest metrics to one score in [0, 1] (or the sentinel).
///
/// Fixed linear normalizations, clamped to [0, 1]:
///
/// | metric        | mapping                                   |
/// |---------------|-------------------------------------------|
/// | total return  | [-50%, +50%] -> [0, 1]                    |
/// | Sharpe        | [-2, +2] -> [0, 1]                        |
/// | max drawdown  | inverted over [0%, 20%]: `1 - dd / 0.20`  |
/// | win rate      | used directly                             |
/// | activity      | `min(trades / ramp_floor, 1)`             |
///
/// Trials below the hard activity floor score [`SENTINEL_SCORE`]: with too
/// few trades every other metric is statistical noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeScorer {
    weights: CompositeWeights,
    /// Trade count at which the activity component saturates
    ramp_floor: u64,
    /// Below this trade count the whole trial is rejected
    hard_floor: u64,
}

impl Default for CompositeScorer {
    fn default() -> Self {
        Self {
            weights: CompositeWeights::default(),
            ramp_floor: 100,
            hard_floor: 50,
        }
    }
}

impl CompositeScorer {
    /// Build a scorer with explicit weights (re-normalized to sum 1.0)
    pub fn new(weights: CompositeWeights) -> Self {
        Self { weights: weights.normalized(), ..Self::default() }
    }

    /// Override the activity ramp floor
    pub fn with_ramp_floor(mut self, trades: u64) -> Self {
        self.ramp_floor = trades.max(1);
        self
    }

    /// Override the hard activity floor
    pub fn with_hard_floor(mut self, trades: u64) -> Self {
        self.hard_floor = trades;
        self
    }

    /// The effective (normalized) weights
    pub fn weights(&self) -> CompositeWeights {
        self.weights.normalized()
    }

    /// Compute the composite score
    pub fn score(&self, m: &RawMetrics) -> f64 {
        if !m.is_finite() {
            return SENTINEL_SCORE;
        }
        if m.trade_count < self.hard_floor {
            return SENTINEL_SCORE;
        }

        let w = self.weights.normalized();
        let return_score = linear(m.total_return, -0.50, 0.50);
        let sharpe_score = linear(m.sharpe_ratio, -2.0, 2.0);
        let drawdown_score = (1.0 - m.max_drawdown / 0.20).clamp(0.0, 1.0);
        let win_score = m.win_rate.clamp(0.0, 1.0);
        let activity_score = (m.trade_count as f64 / self.ramp_floor as f64).min(1.0);

        w.total_return * return_score
            + w.sharpe_ratio * sharpe_score
            + w.max_drawdown * drawdown_score
            + w.win_rate * win_score
            + w.activity * activity_score
    }
}

impl Objective for CompositeScorer {
    fn directions(&self) -> Vec<Direction> {
        vec![Direction::Maximize]
    }

    fn reduce(&self, metrics: &RawMetrics) -> ObjectiveValue {
        ObjectiveValue::Scalar(self.score(metrics))
    }
}

fn linear(value: f64, low: f64, high: f64) -> f64 {
    ((value - low) / (high - low)).clamp(0.0, 1.0)
}
