//! Surrogate sampler: density-ratio (TPE-style) proposal of parameter sets
//!
//! Maintains no history of its own; the study runner owns trial history and
//! passes a consistent snapshot to [`TpeSampler::propose`]. Completed trials
//! are split into a "good" top quantile and a "bad" remainder; per parameter,
//! a density is fit over each subset and candidates drawn from the good
//! density are ranked by the ratio good/bad, an expected-improvement proxy.
//!
//! The continuous density estimator is a Gaussian-kernel mixture centered at
//! observed values (bandwidth = range/10, scaled by `kde_bandwidth`);
//! integer and categorical parameters use Laplace-smoothed counts. The
//! design fixes the quantile-split-plus-ratio criterion, not the kernel
//! family; the Gaussian mixture is this crate's documented choice.
//!
//! Proposals are a pure function of `(seed, trial index, history snapshot)`:
//! each proposal derives its own `StdRng`, so a paused or restarted study
//! replays identical proposals from the same history.
//!
//! # References
//!
//! \[1\] Bergstra et al. (2011) - Algorithms for Hyper-Parameter Optimization (TPE)

mod sampling;
mod tpe;


pub use tpe::{SamplerConfig, TpeSampler};
