//! Adaptive re-optimization trigger
//!
//! A background controller that decides *when* the strategy needs a new
//! optimization study. Three sources, in priority order: sustained
//! degradation of live rolling metrics, a scheduled maximum interval since
//! the last optimization, and a regime change reported by the external
//! classifier. Each source maps to a strategy preset (aggressive,
//! conservative, regime-scoped) that shapes the study it requests.
//!
//! Only one study runs at a time. Triggers that fire while a study is
//! active are queued, deduplicated by kind, and drained FIFO when the
//! active study finishes.
//!
//! # Toyota Way: Kaizen
//!
//! Continuous improvement is scheduled, not heroic: the controller watches
//! the live metrics and re-tunes before performance decay becomes loss.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::space::SearchSpace;
use crate::study::StudyConfig;

/// Market regime labels supplied by the external classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Trending,
    Ranging,
    Volatile,
}

/// Recent market data handed to the classifier
#[derive(Debug, Clone)]
pub struct MarketWindow {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Closing prices, oldest first
    pub closes: Vec<f64>,
}

/// External regime classifier collaborator
pub trait RegimeClassifier: Send {
    fn classify(&self, window: &MarketWindow) -> Regime;
}

/// What fired a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Degradation,
    Schedule,
    RegimeChange,
}

/// Which slice of the space and how much budget a triggered study gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyPreset {
    /// Full space, large budget, long timeout
    Aggressive,
    /// Risk-parameter subset, small budget, short timeout
    Conservative,
    /// Technical-indicator subset
    RegimeScoped,
}

impl StrategyPreset {
    /// The study shape this preset requests. Subsets are taken by group
    /// name; a space without the group falls back to the full space.
    pub fn study_shape(&self, space: &SearchSpace) -> (SearchSpace, StudyConfig) {
        let subset = |group: &str| {
            let s = space.group_subset(group);
            if s.is_empty() {
                space.clone()
            } else {
                s
            }
        };
        match self {
            StrategyPreset::Aggressive => (
                space.clone(),
                StudyConfig {
                    n_trials: 200,
                    study_timeout: Some(StdDuration::from_secs(4 * 3600)),
                    ..StudyConfig::default()
                },
            ),
            StrategyPreset::Conservative => (
                subset("risk"),
                StudyConfig {
                    n_trials: 40,
                    study_timeout: Some(StdDuration::from_secs(30 * 60)),
                    ..StudyConfig::default()
                },
            ),
            StrategyPreset::RegimeScoped => (
                subset("indicators"),
                StudyConfig {
                    n_trials: 80,
                    study_timeout: Some(StdDuration::from_secs(3600)),
                    ..StudyConfig::default()
                },
            ),
        }
    }
}

/// A request to start one optimization study
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRequest {
    pub kind: TriggerKind,
    pub preset: StrategyPreset,
    pub reason: String,
    /// Set for regime-change requests
    pub regime: Option<Regime>,
    pub requested_at: DateTime<Utc>,
}

/// Thresholds and intervals, all injected; the controller holds no
/// module-level state
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Loop wake interval
    pub wake_interval: StdDuration,
    /// Maximum time between optimizations before a scheduled study fires
    pub max_interval: Duration,
    /// Rolling Sharpe below this is a degradation breach
    pub min_sharpe: f64,
    /// Rolling drawdown above this fraction is a breach
    pub max_drawdown: f64,
    /// Rolling win rate below this is a breach
    pub min_win_rate: f64,
    /// Observations a breach must persist for before it counts
    pub degradation_window: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            wake_interval: StdDuration::from_secs(3600),
            max_interval: Duration::days(7),
            min_sharpe: 0.5,
            max_drawdown: 0.15,
            min_win_rate: 0.45,
            degradation_window: 24,
        }
    }
}

/// Fixed-size window over one live metric. A breach only counts once every
/// slot in a full window violates the threshold, so a single bad
/// observation never triggers a study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingMetric {
    window_size: usize,
    values: VecDeque<f64>,
}

impl RollingMetric {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            values: VecDeque::new(),
        }
    }

    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.values.len() >= self.window_size {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// True iff the window is full and every value violates `breach`
    pub fn sustained(&self, breach: impl Fn(f64) -> bool) -> bool {
        self.values.len() == self.window_size && self.values.iter().copied().all(breach)
    }
}

/// Point-in-time view the decision function works from
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSnapshot {
    /// Name of the first metric in sustained breach, if any
    pub degraded_metric: Option<String>,
    /// When the last optimization study finished
    pub last_optimization: Option<DateTime<Utc>>,
    /// Regime change observed since the last study, if any
    pub regime_change: Option<Regime>,
}

/// Pure trigger decision. Priority: degradation, then schedule, then
/// regime change. Returns at most one request; queueing and the
/// one-study-at-a-time rule live in the controller.
pub fn decide(now: DateTime<Utc>, snapshot: &TriggerSnapshot, config: &TriggerConfig) -> Option<StudyRequest> {
    if let Some(metric) = &snapshot.degraded_metric {
        return Some(StudyRequest {
            kind: TriggerKind::Degradation,
            preset: StrategyPreset::Aggressive,
            reason: format!("sustained degradation of {metric}"),
            regime: None,
            requested_at: now,
        });
    }
    let due = match snapshot.last_optimization {
        Some(last) => now - last >= config.max_interval,
        // Never optimized: the schedule is immediately due
        None => true,
    };
    if due {
        return Some(StudyRequest {
            kind: TriggerKind::Schedule,
            preset: StrategyPreset::Conservative,
            reason: format!("max interval {} elapsed", config.max_interval),
            regime: None,
            requested_at: now,
        });
    }
    if let Some(regime) = snapshot.regime_change {
        return Some(StudyRequest {
            kind: TriggerKind::RegimeChange,
            preset: StrategyPreset::RegimeScoped,
            reason: format!("regime changed to {regime:?}"),
            regime: Some(regime),
            requested_at: now,
        });
    }
    None
}

#[derive(Debug)]
struct ControllerState {
    sharpe: RollingMetric,
    drawdown: RollingMetric,
    win_rate: RollingMetric,
    last_regime: Option<Regime>,
    pending_regime: Option<Regime>,
    last_optimization: Option<DateTime<Utc>>,
    study_active: bool,
    queue: VecDeque<StudyRequest>,
}

impl ControllerState {
    fn new(config: &TriggerConfig) -> Self {
        Self {
            sharpe: RollingMetric::new(config.degradation_window),
            drawdown: RollingMetric::new(config.degradation_window),
            win_rate: RollingMetric::new(config.degradation_window),
            last_regime: None,
            pending_regime: None,
            last_optimization: None,
            study_active: false,
            queue: VecDeque::new(),
        }
    }

    fn snapshot(&self, config: &TriggerConfig) -> TriggerSnapshot {
        let degraded = if self.sharpe.sustained(|v| v < config.min_sharpe) {
            Some("sharpe_ratio".to_string())
        } else if self.drawdown.sustained(|v| v > config.max_drawdown) {
            Some("max_drawdown".to_string())
        } else if self.win_rate.sustained(|v| v < config.min_win_rate) {
            Some("win_rate".to_string())
        } else {
            None
        };
        TriggerSnapshot {
            degraded_metric: degraded,
            last_optimization: self.last_optimization,
            regime_change: self.pending_regime,
        }
    }
}

/// The controller: rolling metric state, the request queue, and an
/// explicit `start`/`stop` lifecycle for the loop thread
pub struct TriggerController {
    config: TriggerConfig,
    state: Arc<Mutex<ControllerState>>,
    wake: Arc<Condvar>,
    stop: Arc<AtomicBool>,
    loop_thread: Option<JoinHandle<()>>,
}

impl TriggerController {
    pub fn new(config: TriggerConfig) -> Self {
        let state = ControllerState::new(&config);
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            wake: Arc::new(Condvar::new()),
            stop: Arc::new(AtomicBool::new(false)),
            loop_thread: None,
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Feed one observation of the live rolling metrics
    pub fn observe_metrics(&self, sharpe: f64, drawdown: f64, win_rate: f64) {
        let mut state = self.locked();
        state.sharpe.push(sharpe);
        state.drawdown.push(drawdown);
        state.win_rate.push(win_rate);
    }

    /// Record the classifier's label; a change from the previous label
    /// arms a regime trigger
    pub fn observe_regime(&self, regime: Regime) {
        let mut state = self.locked();
        if state.last_regime.is_some_and(|r| r != regime) {
            state.pending_regime = Some(regime);
        }
        state.last_regime = Some(regime);
    }

    /// Mark the active study finished; the next `poll` may drain the queue
    pub fn study_finished(&self, at: DateTime<Utc>) {
        let mut state = self.locked();
        state.study_active = false;
        state.last_optimization = Some(at);
    }

    /// One controller step: drain the queue if idle, otherwise consult
    /// [`decide`]. A returned request means its study is now active.
    pub fn poll(&self, now: DateTime<Utc>) -> Option<StudyRequest> {
        let mut state = self.locked();
        poll_locked(&mut state, now, &self.config)
    }

    /// Pending queued requests (oldest first)
    pub fn queued(&self) -> Vec<StudyRequest> {
        self.locked().queue.iter().cloned().collect()
    }

    /// Spawn the loop thread. Each wake polls and hands any request to
    /// `on_request`; the callback is expected to start the study and later
    /// call [`study_finished`](Self::study_finished).
    pub fn start<F>(&mut self, on_request: F)
    where
        F: Fn(StudyRequest) + Send + 'static,
    {
        if self.loop_thread.is_some() {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        let wake = Arc::clone(&self.wake);
        let stop = Arc::clone(&self.stop);
        let config = self.config.clone();
        let interval = self.config.wake_interval;
        self.loop_thread = Some(std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let request = {
                    let mut guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    let request = poll_locked(&mut guard, Utc::now(), &config);
                    if request.is_none() {
                        let (g, _) = wake
                            .wait_timeout(guard, interval)
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        drop(g);
                    }
                    request
                };
                if let Some(request) = request {
                    on_request(request);
                }
            }
        }));
    }

    /// Stop and join the loop thread
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_all();
        if let Some(handle) = self.loop_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TriggerController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Core of [`TriggerController::poll`], also driven by the loop thread
fn poll_locked(
    state: &mut ControllerState,
    now: DateTime<Utc>,
    config: &TriggerConfig,
) -> Option<StudyRequest> {
    if state.study_active {
        // A study is running; new triggers queue instead of returning
        if let Some(request) = decide(now, &state.snapshot(config), config) {
            if state.queue.iter().all(|q| q.kind != request.kind) {
                if request.kind == TriggerKind::RegimeChange {
                    state.pending_regime = None;
                }
                state.queue.push_back(request);
            }
        }
        return None;
    }
    if let Some(queued) = state.queue.pop_front() {
        state.study_active = true;
        return Some(queued);
    }
    let request = decide(now, &state.snapshot(config), config)?;
    if request.kind == TriggerKind::RegimeChange {
        state.pending_regime = None;
    }
    state.study_active = true;
    Some(request)
}
