use approx::assert_relative_eq;

use super::*;
use crate::trial::Direction;

fn reference_metrics() -> RawMetrics {
    RawMetrics {
        total_return: 0.15,
        sharpe_ratio: 1.5,
        max_drawdown: 0.08,
        win_rate: 0.68,
        trade_count: 150,
        extra: Default::default(),
    }
}

// -------------------------------------------------------------------------
// Composite Scorer Tests
// -------------------------------------------------------------------------

#[test]
fn test_reference_scenario_score() {
    // {return +15%, sharpe 1.5, dd 8%, win 68%, trades 150} with default
    // weights: 0.30*0.65 + 0.25*0.875 + 0.20*0.60 + 0.15*0.68 + 0.10*1.0
    let scorer = CompositeScorer::default();
    let score = scorer.score(&reference_metrics());
    assert_relative_eq!(score, 0.73575, epsilon = 1e-9);
    assert!((score - 0.730).abs() < 0.01);
}

#[test]
fn test_weights_normalize_to_one() {
    let scorer = CompositeScorer::new(CompositeWeights {
        total_return: 3.0,
        sharpe_ratio: 2.5,
        max_drawdown: 2.0,
        win_rate: 1.5,
        activity: 1.0,
    });
    let w = scorer.weights();
    let sum = w.total_return + w.sharpe_ratio + w.max_drawdown + w.win_rate + w.activity;
    assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
    // Same proportions as the defaults, so the same score
    assert_relative_eq!(
        scorer.score(&reference_metrics()),
        CompositeScorer::default().score(&reference_metrics()),
        epsilon = 1e-12
    );
}

#[test]
fn test_normalization_clamps() {
    let scorer = CompositeScorer::default();
    let extreme = RawMetrics {
        total_return: 3.0, // way past +50%
        sharpe_ratio: 10.0,
        max_drawdown: 0.0,
        win_rate: 1.0,
        trade_count: 10_000,
        extra: Default::default(),
    };
    assert_relative_eq!(scorer.score(&extreme), 1.0, epsilon = 1e-12);

    let terrible = RawMetrics {
        total_return: -0.9,
        sharpe_ratio: -5.0,
        max_drawdown: 0.6,
        win_rate: 0.0,
        trade_count: 60,
        extra: Default::default(),
    };
    let score = scorer.score(&terrible);
    // Only the activity ramp contributes
    assert_relative_eq!(score, 0.10 * 0.60, epsilon = 1e-12);
}

#[test]
fn test_hard_activity_floor_sentinel() {
    let scorer = CompositeScorer::default();
    let mut m = reference_metrics();
    m.trade_count = 49;
    assert_eq!(scorer.score(&m), SENTINEL_SCORE);
    m.trade_count = 50;
    assert!(scorer.score(&m) > 0.0);
}

#[test]
fn test_activity_ramp_below_floor() {
    let scorer = CompositeScorer::default();
    let mut m = reference_metrics();
    m.trade_count = 80; // above hard floor, below ramp floor
    let full = scorer.score(&reference_metrics());
    let ramped = scorer.score(&m);
    assert_relative_eq!(full - ramped, 0.10 * 0.20, epsilon = 1e-12);
}

#[test]
fn test_malformed_metrics_sentinel() {
    let scorer = CompositeScorer::default();
    let mut m = reference_metrics();
    m.sharpe_ratio = f64::NAN;
    assert_eq!(scorer.score(&m), SENTINEL_SCORE);
    let mut m = reference_metrics();
    m.total_return = f64::INFINITY;
    assert_eq!(scorer.score(&m), SENTINEL_SCORE);
}

#[test]
fn test_weight_shift_reorders_differing_profiles() {
    // Trial A: high return, deep drawdown. Trial B: modest return, shallow
    // drawdown. Shifting weight from return to drawdown must flip their
    // ranking; identical metric vectors must never reorder.
    let a = RawMetrics {
        total_return: 0.40,
        sharpe_ratio: 1.0,
        max_drawdown: 0.18,
        win_rate: 0.5,
        trade_count: 200,
        extra: Default::default(),
    };
    let b = RawMetrics {
        total_return: 0.05,
        sharpe_ratio: 1.0,
        max_drawdown: 0.01,
        win_rate: 0.5,
        trade_count: 200,
        extra: Default::default(),
    };

    let return_heavy = CompositeScorer::new(CompositeWeights {
        total_return: 0.45,
        max_drawdown: 0.05,
        ..CompositeWeights::default()
    });
    let drawdown_heavy = CompositeScorer::new(CompositeWeights {
        total_return: 0.05,
        max_drawdown: 0.45,
        ..CompositeWeights::default()
    });

    assert!(return_heavy.score(&a) > return_heavy.score(&b));
    assert!(drawdown_heavy.score(&a) < drawdown_heavy.score(&b));

    // Identical vectors stay tied under any weighting
    assert_relative_eq!(return_heavy.score(&a), return_heavy.score(&a.clone()));
    assert_relative_eq!(drawdown_heavy.score(&b), drawdown_heavy.score(&b.clone()));
}

#[test]
fn test_composite_objective_trait() {
    let scorer = CompositeScorer::default();
    assert_eq!(scorer.directions(), vec![Direction::Maximize]);
    match scorer.reduce(&reference_metrics()) {
        crate::trial::ObjectiveValue::Scalar(v) => assert!(v > 0.7),
        other => panic!("expected scalar, got {other:?}"),
    }
}

// -------------------------------------------------------------------------
// Vector Objective Tests
// -------------------------------------------------------------------------

#[test]
fn test_vector_objective_no_reduction() {
    let obj = VectorObjective::return_sharpe_drawdown();
    assert_eq!(
        obj.directions(),
        vec![Direction::Maximize, Direction::Maximize, Direction::Minimize]
    );
    match obj.reduce(&reference_metrics()) {
        crate::trial::ObjectiveValue::Vector(v) => {
            assert_eq!(v, vec![0.15, 1.5, 0.08]);
        }
        other => panic!("expected vector, got {other:?}"),
    }
}

#[test]
fn test_vector_objective_extra_metric() {
    let mut m = reference_metrics();
    m.extra.insert("sortino".to_string(), 2.1);
    let obj = VectorObjective::new(vec![
        (MetricKey::Extra("sortino".to_string()), Direction::Maximize),
        (MetricKey::TradeCount, Direction::Maximize),
    ]);
    match obj.reduce(&m) {
        crate::trial::ObjectiveValue::Vector(v) => assert_eq!(v, vec![2.1, 150.0]),
        other => panic!("expected vector, got {other:?}"),
    }
}

#[test]
fn test_metric_key_missing_extra_is_nan() {
    let m = reference_metrics();
    assert!(m.get(&MetricKey::Extra("missing".to_string())).is_nan());
}

// -------------------------------------------------------------------------
// Property Tests
// -------------------------------------------------------------------------

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_composite_in_unit_interval_or_sentinel(
            total_return in -2.0f64..2.0,
            sharpe in -5.0f64..5.0,
            drawdown in 0.0f64..1.0,
            win_rate in 0.0f64..1.0,
            trades in 0u64..1000
        ) {
            let scorer = CompositeScorer::default();
            let m = RawMetrics {
                total_return,
                sharpe_ratio: sharpe,
                max_drawdown: drawdown,
                win_rate,
                trade_count: trades,
                extra: Default::default(),
            };
            let score = scorer.score(&m);
            prop_assert!(score == SENTINEL_SCORE || (0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_weights_always_sum_to_one(
            wr in 0.01f64..10.0,
            ws in 0.01f64..10.0,
            wd in 0.01f64..10.0,
            ww in 0.01f64..10.0,
            wa in 0.01f64..10.0
        ) {
            let scorer = CompositeScorer::new(CompositeWeights {
                total_return: wr,
                sharpe_ratio: ws,
                max_drawdown: wd,
                win_rate: ww,
                activity: wa,
            });
            let w = scorer.weights();
            let sum = w.total_return + w.sharpe_ratio + w.max_drawdown + w.win_rate + w.activity;
            prop_assert!((sum - 1.0).abs() < 1e-9);
        }
    }
}
