//! Raw backtest metrics and the evaluation collaborator contract

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::space::ParameterSet;
use crate::trial::TrialContext;

/// Failure modes of the backtest collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("insufficient historical data: {0}")]
    InsufficientData(String),

    #[error("simulation error: {0}")]
    Simulation(String),

    #[error("malformed metrics: {0}")]
    Malformed(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

/// What the backtest should run over: the historical window and symbol set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalScope {
    /// Evaluation window; `None` means the collaborator's full history
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Symbols to simulate; empty means the collaborator's default universe
    pub symbols: Vec<String>,
}

/// Raw trading-performance metrics from one backtest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    /// Total return over the window, as a fraction (0.15 = +15%)
    pub total_return: f64,
    /// Annualized Sharpe ratio
    pub sharpe_ratio: f64,
    /// Maximum drawdown, as a positive fraction (0.08 = 8%)
    pub max_drawdown: f64,
    /// Fraction of winning trades
    pub win_rate: f64,
    /// Number of executed trades
    pub trade_count: u64,
    /// Additional collaborator-specific metrics
    pub extra: BTreeMap<String, f64>,
}

/// Keys addressing individual metrics, for vector objectives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKey {
    TotalReturn,
    SharpeRatio,
    MaxDrawdown,
    WinRate,
    TradeCount,
    Extra(String),
}

impl RawMetrics {
    /// Look up a metric by key; unknown extras read as NaN (which fails the
    /// finiteness check and marks the trial failed)
    pub fn get(&self, key: &MetricKey) -> f64 {
        match key {
            MetricKey::TotalReturn => self.total_return,
            MetricKey::SharpeRatio => self.sharpe_ratio,
            MetricKey::MaxDrawdown => self.max_drawdown,
            MetricKey::WinRate => self.win_rate,
            MetricKey::TradeCount => self.trade_count as f64,
            MetricKey::Extra(name) => self.extra.get(name).copied().unwrap_or(f64::NAN),
        }
    }

    /// Whether the core metrics are all finite (malformed collaborator
    /// output is treated as a failed trial, never a crash)
    pub fn is_finite(&self) -> bool {
        self.total_return.is_finite()
            && self.sharpe_ratio.is_finite()
            && self.max_drawdown.is_finite()
            && self.win_rate.is_finite()
    }
}

/// The backtest collaborator.
///
/// Turns a parameter assignment into trade outcomes over the requested
/// scope. Long-running implementations should call
/// [`TrialContext::report`] at each evaluation step (e.g. per walk-forward
/// segment) and return promptly with [`EvalError::Cancelled`] when it
/// yields `false`; that is how pruning, timeouts, and study stop reach
/// the backtest.
pub trait Evaluator: Send + Sync {
    /// Run one backtest for the given assignment
    fn evaluate(
        &self,
        params: &ParameterSet,
        scope: &EvalScope,
        ctx: &TrialContext,
    ) -> Result<RawMetrics, EvalError>;
}
