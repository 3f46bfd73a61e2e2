use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::objective::{
    CompositeScorer, EvalError, EvalScope, Evaluator, Objective, RawMetrics, VectorObjective,
};
use crate::space::{ParamDomain, ParameterSet, SearchSpace};
use crate::trial::{ObjectiveValue, TrialContext, TrialState};

fn space_1d() -> SearchSpace {
    let mut space = SearchSpace::new();
    space.add("x", ParamDomain::real(0.0, 1.0));
    space
}

fn metrics_for(x: f64) -> RawMetrics {
    RawMetrics {
        // Best around x = 0.7
        total_return: 0.30 - (x - 0.7).abs() / 2.0,
        sharpe_ratio: 1.0,
        max_drawdown: 0.05,
        win_rate: 0.55,
        trade_count: 200,
        extra: Default::default(),
    }
}

/// Deterministic stub backtest keyed on the `x` parameter
struct StubBacktest;

impl Evaluator for StubBacktest {
    fn evaluate(
        &self,
        params: &ParameterSet,
        _scope: &EvalScope,
        _ctx: &TrialContext,
    ) -> Result<RawMetrics, EvalError> {
        Ok(metrics_for(params.get_float("x").unwrap_or(0.0)))
    }
}

fn sequential_config(n_trials: usize, seed: u64) -> StudyConfig {
    StudyConfig {
        n_trials,
        max_concurrent_trials: 1,
        seed,
        ..StudyConfig::default()
    }
}

// -------------------------------------------------------------------------
// Study State Tests
// -------------------------------------------------------------------------

#[test]
fn test_empty_study_has_no_best() {
    let study = Study::new("empty", vec![crate::trial::Direction::Maximize], 0);
    assert!(study.best_trial().is_none());
    assert!(study.best_value().is_none());
    assert_eq!(study.counts(), TrialCounts::default());
}

#[test]
fn test_update_best_ignores_non_complete() {
    let mut study = Study::new("s", vec![crate::trial::Direction::Maximize], 0);
    let mut t = crate::trial::Trial::new(0, "s", ParameterSet::new());
    t.start();
    t.report(1, 5.0);
    t.prune();
    study.trials.push(t);
    study.update_best(0);
    assert!(study.best_trial().is_none());
}

#[test]
fn test_update_best_tracks_extremum() {
    let mut study = Study::new("s", vec![crate::trial::Direction::Maximize], 0);
    for (id, v) in [(0u64, 0.3), (1, 0.8), (2, 0.5)] {
        let mut t = crate::trial::Trial::new(id, "s", ParameterSet::new());
        t.start();
        t.complete(ObjectiveValue::Scalar(v));
        study.trials.push(t);
        study.update_best(id);
    }
    assert_eq!(study.best_trial().unwrap().id, 1);
    assert_eq!(study.best_value(), Some(0.8));
}

#[test]
fn test_study_serde_round_trip() {
    let mut study = Study::new("s", vec![crate::trial::Direction::Maximize], 7);
    let mut t = crate::trial::Trial::new(0, "s", ParameterSet::new());
    t.start();
    t.complete(ObjectiveValue::Scalar(0.4));
    study.trials.push(t);
    study.update_best(0);

    let json = serde_json::to_string(&study).unwrap();
    let parsed: Study = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.seed, 7);
    assert_eq!(parsed.best_value(), Some(0.4));
    assert_eq!(parsed.counts().completed, 1);
}

// -------------------------------------------------------------------------
// Runner Tests
// -------------------------------------------------------------------------

#[test]
fn test_optimize_sequential_finds_good_region() {
    let mut runner = StudyRunner::new("seq", space_1d(), sequential_config(40, 42));
    let report = runner
        .optimize(&StubBacktest, &CompositeScorer::default())
        .unwrap();

    assert_eq!(report.counts.completed, 40);
    assert_eq!(report.counts.running, 0);
    let best_x = report.best_params.unwrap().get_float("x").unwrap();
    assert!((best_x - 0.7).abs() < 0.35, "best x = {best_x}");
    assert!(report.best_value.unwrap() > 0.5);
}

#[test]
fn test_optimize_concurrent_terminates_all_trials() {
    let config = StudyConfig {
        n_trials: 30,
        max_concurrent_trials: 4,
        seed: 7,
        ..StudyConfig::default()
    };
    let mut runner = StudyRunner::new("conc", space_1d(), config);
    let report = runner
        .optimize(&StubBacktest, &CompositeScorer::default())
        .unwrap();

    let counts = report.counts;
    assert_eq!(counts.completed + counts.pruned + counts.failed, 30);
    assert_eq!(counts.running, 0);
    assert!(report.best_value.is_some());
    assert_eq!(runner.handle().status().state, StudyState::Finished);
}

#[test]
fn test_failed_trials_do_not_stop_study() {
    struct Flaky;
    impl Evaluator for Flaky {
        fn evaluate(
            &self,
            params: &ParameterSet,
            _scope: &EvalScope,
            _ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            let x = params.get_float("x").unwrap_or(0.0);
            if x < 0.3 {
                Err(EvalError::Simulation("synthetic blowup".to_string()))
            } else {
                Ok(metrics_for(x))
            }
        }
    }

    let mut runner = StudyRunner::new("flaky", space_1d(), sequential_config(30, 11));
    let report = runner
        .optimize(&Flaky, &CompositeScorer::default())
        .unwrap();

    assert!(report.counts.failed > 0);
    assert!(report.counts.completed > 0);
    assert!(report.best_value.is_some());
}

#[test]
fn test_consecutive_failures_abort_study() {
    struct AlwaysFails;
    impl Evaluator for AlwaysFails {
        fn evaluate(
            &self,
            _params: &ParameterSet,
            _scope: &EvalScope,
            _ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            Err(EvalError::InsufficientData("no candles".to_string()))
        }
    }

    let config = StudyConfig {
        max_consecutive_failures: 3,
        ..sequential_config(50, 1)
    };
    let mut runner = StudyRunner::new("dead", space_1d(), config);
    let err = runner
        .optimize(&AlwaysFails, &CompositeScorer::default())
        .unwrap_err();
    assert!(matches!(err, crate::error::AfinarError::StudyAborted { .. }));
    // Recorded history is preserved through the abort
    assert_eq!(runner.study().counts().failed, 3);
}

#[test]
fn test_malformed_metrics_mark_trial_failed() {
    struct NanBacktest;
    impl Evaluator for NanBacktest {
        fn evaluate(
            &self,
            _params: &ParameterSet,
            _scope: &EvalScope,
            _ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            Ok(RawMetrics { sharpe_ratio: f64::NAN, ..metrics_for(0.5) })
        }
    }

    let config = StudyConfig {
        max_consecutive_failures: 100,
        ..sequential_config(5, 3)
    };
    let mut runner = StudyRunner::new("nan", space_1d(), config);
    let report = runner
        .optimize(&NanBacktest, &CompositeScorer::default())
        .unwrap();
    assert_eq!(report.counts.failed, 5);
    assert!(report.best_value.is_none());
}

#[test]
fn test_pruning_kills_trailing_trials() {
    /// Reports a per-step value proportional to x; weak trials trail the
    /// median and get pruned once enough comparisons exist.
    struct Reporting;
    impl Evaluator for Reporting {
        fn evaluate(
            &self,
            params: &ParameterSet,
            _scope: &EvalScope,
            ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            let x = params.get_float("x").unwrap_or(0.0);
            for step in 1..=6u64 {
                if !ctx.report(step, x) {
                    return Err(EvalError::Cancelled);
                }
            }
            Ok(metrics_for(x))
        }
    }

    let config = StudyConfig {
        pruner: crate::pruner::PrunerConfig {
            n_startup_trials: 3,
            n_warmup_steps: 2,
            margin: 0.0,
        },
        sampler: crate::sampler::SamplerConfig {
            n_startup_trials: 40, // keep proposals uniform so weak x values occur
            ..Default::default()
        },
        ..sequential_config(40, 5)
    };
    let mut runner = StudyRunner::new("pruned", space_1d(), config);
    let report = runner
        .optimize(&Reporting, &CompositeScorer::default())
        .unwrap();

    assert!(report.counts.pruned > 0, "expected some pruned trials");
    // Pruned trials keep their last reported value in history
    for t in &runner.study().trials {
        if t.state == TrialState::Pruned {
            assert!(t.scalar_value().is_some());
        }
    }
}

#[test]
fn test_leading_trial_never_pruned() {
    /// Every trial reports its x at each step; the best x in a sequential
    /// run is always at or above the running median when it leads.
    struct Reporting;
    impl Evaluator for Reporting {
        fn evaluate(
            &self,
            params: &ParameterSet,
            _scope: &EvalScope,
            ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            let x = params.get_float("x").unwrap_or(0.0);
            for step in 1..=4u64 {
                if !ctx.report(step, x) {
                    return Err(EvalError::Cancelled);
                }
            }
            Ok(metrics_for(x))
        }
    }

    let config = StudyConfig {
        pruner: crate::pruner::PrunerConfig {
            n_startup_trials: 2,
            n_warmup_steps: 1,
            margin: 0.0,
        },
        ..sequential_config(30, 9)
    };
    let mut runner = StudyRunner::new("leader", space_1d(), config);
    runner
        .optimize(&Reporting, &CompositeScorer::default())
        .unwrap();

    // The trial with the maximum reported value can never have trailed the
    // median of its peers, so it must not be pruned.
    let study = runner.study();
    let leader = study
        .trials
        .iter()
        .filter(|t| !t.reports.is_empty())
        .max_by(|a, b| {
            a.reports[0]
                .value
                .partial_cmp(&b.reports[0].value)
                .unwrap()
        })
        .unwrap();
    assert_ne!(leader.state, TrialState::Pruned);
}

#[test]
fn test_trial_timeout_marks_failed() {
    struct Slow;
    impl Evaluator for Slow {
        fn evaluate(
            &self,
            _params: &ParameterSet,
            _scope: &EvalScope,
            ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            for step in 0..200u64 {
                std::thread::sleep(Duration::from_millis(10));
                if !ctx.report(step, 0.0) {
                    return Err(EvalError::Cancelled);
                }
            }
            Ok(metrics_for(0.5))
        }
    }

    let config = StudyConfig {
        trial_timeout: Some(Duration::from_millis(60)),
        max_consecutive_failures: 100,
        ..sequential_config(2, 2)
    };
    let mut runner = StudyRunner::new("slow", space_1d(), config);
    let report = runner.optimize(&Slow, &CompositeScorer::default()).unwrap();
    // Timed out, not pruned: no comparison judgment was made
    assert_eq!(report.counts.failed, 2);
    assert_eq!(report.counts.pruned, 0);
}

#[test]
fn test_study_timeout_ends_cleanly() {
    struct Slowish;
    impl Evaluator for Slowish {
        fn evaluate(
            &self,
            params: &ParameterSet,
            _scope: &EvalScope,
            _ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            std::thread::sleep(Duration::from_millis(15));
            Ok(metrics_for(params.get_float("x").unwrap_or(0.0)))
        }
    }

    let config = StudyConfig {
        study_timeout: Some(Duration::from_millis(100)),
        ..sequential_config(10_000, 4)
    };
    let mut runner = StudyRunner::new("budget", space_1d(), config);
    let report = runner
        .optimize(&Slowish, &CompositeScorer::default())
        .unwrap();
    // Ended early with whatever best exists, not an error
    assert!(report.counts.completed < 10_000);
    assert!(report.best_value.is_some());
}

#[test]
fn test_stop_and_resume_replays_proposals() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    struct StopAfter8 {
        handle: StudyHandle,
    }
    impl Evaluator for StopAfter8 {
        fn evaluate(
            &self,
            params: &ParameterSet,
            _scope: &EvalScope,
            _ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            if CALLS.fetch_add(1, Ordering::SeqCst) + 1 == 8 {
                self.handle.stop();
            }
            Ok(metrics_for(params.get_float("x").unwrap_or(0.0)))
        }
    }

    let scorer = CompositeScorer::default();

    // Uninterrupted reference run
    let mut reference = StudyRunner::new("ref", space_1d(), sequential_config(20, 77));
    reference.optimize(&StubBacktest, &scorer).unwrap();

    // Interrupted run: stop after 8 trials, then resume
    let mut interrupted = StudyRunner::new("ref", space_1d(), sequential_config(20, 77));
    let evaluator = StopAfter8 { handle: interrupted.handle() };
    interrupted.optimize(&evaluator, &scorer).unwrap();
    assert_eq!(interrupted.study().trials.len(), 8);

    interrupted.optimize(&StubBacktest, &scorer).unwrap();
    assert_eq!(interrupted.study().trials.len(), 20);

    for (a, b) in reference
        .study()
        .trials
        .iter()
        .zip(interrupted.study().trials.iter())
    {
        assert_eq!(a.params, b.params, "proposal {} diverged after resume", a.id);
    }
}

#[test]
fn test_pause_during_final_trial_still_finishes() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    struct PauseAtEnd {
        handle: StudyHandle,
        budget: usize,
    }
    impl Evaluator for PauseAtEnd {
        fn evaluate(
            &self,
            params: &ParameterSet,
            _scope: &EvalScope,
            _ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            if CALLS.fetch_add(1, Ordering::SeqCst) + 1 == self.budget {
                self.handle.pause();
            }
            Ok(metrics_for(params.get_float("x").unwrap_or(0.0)))
        }
    }

    // Pausing while the last budgeted trial is in flight must not wedge the
    // control loop: with no budget left there is nothing to resume into
    let mut runner = StudyRunner::new("pause-end", space_1d(), sequential_config(6, 13));
    let evaluator = PauseAtEnd { handle: runner.handle(), budget: 6 };
    let report = runner.optimize(&evaluator, &CompositeScorer::default()).unwrap();
    assert_eq!(report.counts.completed, 6);
    assert!(report.best_value.is_some());
}

#[test]
fn test_multi_objective_builds_front() {
    struct TwoGoals;
    impl Evaluator for TwoGoals {
        fn evaluate(
            &self,
            params: &ParameterSet,
            _scope: &EvalScope,
            _ctx: &TrialContext,
        ) -> Result<RawMetrics, EvalError> {
            let x = params.get_float("x").unwrap_or(0.0);
            // Return and drawdown trade off against each other
            Ok(RawMetrics {
                total_return: x,
                sharpe_ratio: 1.0,
                max_drawdown: x / 2.0,
                win_rate: 0.5,
                trade_count: 200,
                extra: Default::default(),
            })
        }
    }

    let objective = VectorObjective::return_sharpe_drawdown();
    let mut runner = StudyRunner::new_multi(
        "multi",
        space_1d(),
        objective.directions(),
        sequential_config(25, 13),
    );
    let report = runner.optimize(&TwoGoals, &objective).unwrap();

    assert!(!report.pareto_front.is_empty());
    // Front must be mutually non-dominated
    let dirs = objective.directions();
    for a in &report.pareto_front {
        for b in &report.pareto_front {
            if a.trial_id != b.trial_id {
                assert!(!crate::objective::dominates(&a.values, &b.values, &dirs));
            }
        }
    }
}

#[test]
fn test_status_reports_taxonomy_counts() {
    let mut runner = StudyRunner::new("status", space_1d(), sequential_config(10, 21));
    let handle = runner.handle();
    assert_eq!(handle.status().state, StudyState::Idle);

    runner
        .optimize(&StubBacktest, &CompositeScorer::default())
        .unwrap();

    let status = handle.status();
    assert_eq!(status.state, StudyState::Finished);
    assert_eq!(status.counts.completed, 10);
    assert!(status.best_value.is_some());
    assert!(status.elapsed > Duration::ZERO);
}
