//! # afinar
//!
//! Adaptive parameter tuning for multi-indicator trading strategies.
//!
//! Searches a typed space of indicator periods, thresholds, component
//! weights, and risk settings for assignments that maximize a multi-metric
//! trading objective. Sample-efficient Bayesian search (TPE-style
//! density-ratio surrogate), median pruning of unpromising backtests, an
//! adaptive trigger loop that decides *when* to re-optimize, and a safety
//! gate in front of every deployment.
//!
//! # Toyota Way: Kaizen
//!
//! Each completed backtest informs the next proposal. Knowledge accumulates
//! in the study instead of being burned in exhaustive grid sweeps.
//!
//! # Example
//!
//! ```
//! use afinar::space::{ParamDomain, SearchSpace};
//! use afinar::study::{StudyConfig, StudyRunner};
//! use afinar::objective::{CompositeScorer, EvalError, EvalScope, Evaluator, RawMetrics};
//! use afinar::trial::TrialContext;
//! use afinar::ParameterSet;
//!
//! struct StubBacktest;
//!
//! impl Evaluator for StubBacktest {
//!     fn evaluate(&self, params: &ParameterSet, _scope: &EvalScope, _ctx: &TrialContext)
//!         -> Result<RawMetrics, EvalError>
//!     {
//!         let period = params.get_int("rsi_period").unwrap_or(14) as f64;
//!         Ok(RawMetrics {
//!             total_return: 0.10 - (period - 21.0).abs() / 200.0,
//!             sharpe_ratio: 1.2,
//!             max_drawdown: 0.08,
//!             win_rate: 0.55,
//!             trade_count: 180,
//!             extra: Default::default(),
//!         })
//!     }
//! }
//!
//! let mut space = SearchSpace::new();
//! space.add("rsi_period", ParamDomain::Integer { low: 7, high: 30, step: 1 });
//!
//! let config = StudyConfig { n_trials: 25, seed: 42, ..StudyConfig::default() };
//! let mut runner = StudyRunner::new("demo", space, config);
//! let report = runner.optimize(&StubBacktest, &CompositeScorer::default()).unwrap();
//! assert!(report.best_value.is_some());
//! ```
//!
//! # References
//!
//! \[1\] Bergstra et al. (2011) - Algorithms for Hyper-Parameter Optimization (TPE)
//! \[2\] Deb et al. (2002) - A Fast and Elitist Multiobjective Genetic Algorithm (NSGA-II)

pub mod error;
pub mod objective;
pub mod pruner;
pub mod safety;
pub mod sampler;
pub mod space;
pub mod storage;
pub mod study;
pub mod trial;
pub mod trigger;

pub use error::{AfinarError, Result};
pub use space::{ParamDomain, ParamValue, ParameterSet, SearchSpace};
pub use trial::{ObjectiveValue, Trial, TrialState};
