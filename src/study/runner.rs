//! The study control loop: worker pool, single-writer bookkeeping,
//! timeouts, and cooperative cancellation

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{AfinarError, Result};
use crate::objective::pareto::FrontMember;
use crate::objective::{EvalError, Evaluator, Objective, RawMetrics, SENTINEL_SCORE};
use crate::pruner::MedianPruner;
use crate::sampler::TpeSampler;
use crate::space::{ParameterSet, SearchSpace};
use crate::trial::{Trial, TrialContext, TrialState};

use super::{Study, StudyConfig, TrialCounts};

/// Where a study is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyState {
    Idle,
    Running,
    Paused,
    Stopped,
    Finished,
}

/// A point-in-time status snapshot.
///
/// Always carries the failure taxonomy counts alongside best-value
/// progress; operators should never have to dig for failed/pruned tallies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyStatus {
    pub study_id: String,
    pub state: StudyState,
    pub counts: TrialCounts,
    pub best_value: Option<f64>,
    pub front_size: usize,
    pub elapsed: Duration,
}

/// Final report of an optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    pub study_id: String,
    pub counts: TrialCounts,
    pub best_value: Option<f64>,
    pub best_params: Option<ParameterSet>,
    pub pareto_front: Vec<FrontMember>,
    pub elapsed: Duration,
}

/// Shared control handle: pause/resume/stop and status queries from any
/// thread while the runner's control loop owns the history.
#[derive(Debug, Clone)]
pub struct StudyHandle {
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
    status: Arc<Mutex<StudyStatus>>,
}

impl StudyHandle {
    /// Request a cooperative stop; in-flight trials are cancelled
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stop proposing new trials; in-flight trials run to completion
    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Resume proposing
    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Last published status snapshot. Reads do not block the control loop
    /// beyond the brief snapshot lock.
    pub fn status(&self) -> StudyStatus {
        self.status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Message from a worker when its evaluation returns
struct Done {
    trial_id: u64,
    result: std::result::Result<RawMetrics, EvalError>,
}

/// Drives one study: proposes via the sampler, validates via the registry,
/// dispatches to evaluator workers, forwards reports to the pruner, and
/// finalizes trials, with all bookkeeping on the calling (control) thread.
pub struct StudyRunner {
    study: Study,
    space: SearchSpace,
    config: StudyConfig,
    sampler: TpeSampler,
    pruner: MedianPruner,
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
    status: Arc<Mutex<StudyStatus>>,
    consecutive_failures: usize,
}

impl StudyRunner {
    /// Create a runner for a fresh single-objective study
    pub fn new(study_id: &str, space: SearchSpace, config: StudyConfig) -> Self {
        let study = Study::new(
            study_id,
            vec![crate::trial::Direction::Maximize],
            config.seed,
        );
        Self::resume(study, space, config)
    }

    /// Create a runner for a fresh multi-objective study
    pub fn new_multi(
        study_id: &str,
        space: SearchSpace,
        directions: Vec<crate::trial::Direction>,
        config: StudyConfig,
    ) -> Self {
        let study = Study::new(study_id, directions, config.seed);
        Self::resume(study, space, config)
    }

    /// Resume an existing study (e.g. reloaded from storage). The sampler
    /// reseeds per proposal, so a resumed study replays exactly the
    /// proposals an uninterrupted run would have made.
    pub fn resume(mut study: Study, space: SearchSpace, config: StudyConfig) -> Self {
        study.pareto_front = study.pareto_front.clone().with_max_size(config.max_front_size);
        let status = StudyStatus {
            study_id: study.id.clone(),
            state: StudyState::Idle,
            counts: study.counts(),
            best_value: study.best_value(),
            front_size: study.pareto_front.len(),
            elapsed: Duration::ZERO,
        };
        let sampler = TpeSampler::with_config(study.seed, config.sampler.clone());
        let pruner = MedianPruner::new(config.pruner.clone());
        Self {
            study,
            space,
            config,
            sampler,
            pruner,
            stop: Arc::new(AtomicBool::new(false)),
            pause: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(status)),
            consecutive_failures: 0,
        }
    }

    /// Shared control handle for pause/resume/stop and status queries
    pub fn handle(&self) -> StudyHandle {
        StudyHandle {
            stop: Arc::clone(&self.stop),
            pause: Arc::clone(&self.pause),
            status: Arc::clone(&self.status),
        }
    }

    /// The study's accumulated state
    pub fn study(&self) -> &Study {
        &self.study
    }

    /// Consume the runner, keeping the history (for persistence)
    pub fn into_study(self) -> Study {
        self.study
    }

    /// Run the optimization loop until the trial budget, the study timeout,
    /// or a stop request ends it. May be called again after a stop to
    /// resume: proposals continue from the recorded history.
    pub fn optimize<E, O>(&mut self, evaluator: &E, objective: &O) -> Result<StudyReport>
    where
        E: Evaluator + ?Sized,
        O: Objective + ?Sized,
    {
        self.stop.store(false, Ordering::SeqCst);
        let started = Instant::now();
        let eval_scope = self.config.scope.clone();
        let (report_tx, report_rx) = mpsc::channel::<(u64, u64, f64)>();
        let (done_tx, done_rx) = mpsc::channel::<Done>();

        let mut issued = self.study.trials.len();
        // trial_id -> (dispatch time, stop flag)
        let mut in_flight: HashMap<u64, (Instant, Arc<AtomicBool>)> = HashMap::new();

        std::thread::scope(|scope| -> Result<()> {
            loop {
                let stop_requested =
                    self.stop.load(Ordering::SeqCst) || self.study_timed_out(started);
                let paused = self.pause.load(Ordering::SeqCst);

                if stop_requested {
                    for (_, flag) in in_flight.values() {
                        flag.store(true, Ordering::SeqCst);
                    }
                } else if !paused {
                    // Fill the worker pool
                    while in_flight.len() < self.config.max_concurrent_trials.max(1)
                        && issued < self.config.n_trials
                    {
                        let trial_id = self.study.next_trial_id();
                        let params = self.sampler.propose(
                            trial_id,
                            &self.space,
                            &self.study.trials,
                            self.study.primary_direction(),
                        );
                        // Nothing out of bounds may ever reach the evaluator
                        if let Err(e) = self.space.validate(&params) {
                            Self::cancel_all(&in_flight);
                            return Err(e.into());
                        }

                        let mut trial = Trial::new(trial_id, self.study.id.clone(), params.clone());
                        trial.start();
                        self.study.trials.push(trial);

                        let flag = Arc::new(AtomicBool::new(false));
                        let ctx = TrialContext::new(trial_id, report_tx.clone(), Arc::clone(&flag));
                        in_flight.insert(trial_id, (Instant::now(), Arc::clone(&flag)));
                        issued += 1;

                        let done = done_tx.clone();
                        let worker_scope = eval_scope.clone();
                        scope.spawn(move || {
                            let result = evaluator.evaluate(&params, &worker_scope, &ctx);
                            let _ = done.send(Done { trial_id, result });
                        });
                    }
                }

                // A pause only matters while budget remains: with nothing in
                // flight and nothing left to issue, the study is done either way
                if in_flight.is_empty() && (stop_requested || issued >= self.config.n_trials) {
                    break;
                }

                // Intermediate reports first, so a Done observed below sees
                // the trial's full report history.
                while let Ok((trial_id, step, value)) = report_rx.try_recv() {
                    self.handle_report(trial_id, step, value, &in_flight);
                }

                match done_rx.recv_timeout(Duration::from_millis(20)) {
                    Ok(done) => {
                        while let Ok((trial_id, step, value)) = report_rx.try_recv() {
                            self.handle_report(trial_id, step, value, &in_flight);
                        }
                        in_flight.remove(&done.trial_id);
                        if let Err(e) = self.finalize_trial(done, objective) {
                            Self::cancel_all(&in_flight);
                            return Err(e);
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }

                self.enforce_trial_timeouts(&in_flight);
                self.publish_status(
                    started,
                    if paused { StudyState::Paused } else { StudyState::Running },
                );
            }
            Ok(())
        })?;

        let state = if self.stop.load(Ordering::SeqCst) {
            StudyState::Stopped
        } else {
            StudyState::Finished
        };
        self.publish_status(started, state);

        Ok(self.report(started.elapsed()))
    }

    /// Build the final report from current history
    pub fn report(&self, elapsed: Duration) -> StudyReport {
        StudyReport {
            study_id: self.study.id.clone(),
            counts: self.study.counts(),
            best_value: self.study.best_value(),
            best_params: self.study.best_trial().map(|t| t.params.clone()),
            pareto_front: self.study.pareto_front.members().to_vec(),
            elapsed,
        }
    }

    fn cancel_all(in_flight: &HashMap<u64, (Instant, Arc<AtomicBool>)>) {
        for (_, flag) in in_flight.values() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn study_timed_out(&self, started: Instant) -> bool {
        self.config
            .study_timeout
            .is_some_and(|budget| started.elapsed() >= budget)
    }

    /// Record one intermediate report and run the pruning policy
    fn handle_report(
        &mut self,
        trial_id: u64,
        step: u64,
        value: f64,
        in_flight: &HashMap<u64, (Instant, Arc<AtomicBool>)>,
    ) {
        let Some(idx) = self.study.trials.iter().position(|t| t.id == trial_id) else {
            return;
        };
        if !self.study.trials[idx].report(step, value) {
            return; // terminal, report dropped
        }

        let should_prune = self.pruner.should_prune(
            &self.study.trials[idx],
            step,
            value,
            &self.study.trials,
            self.study.primary_direction(),
        );
        if should_prune {
            self.study.trials[idx].prune();
            if let Some((_, flag)) = in_flight.get(&trial_id) {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Fold a worker's result into the study
    fn finalize_trial<O>(&mut self, done: Done, objective: &O) -> Result<()>
    where
        O: Objective + ?Sized,
    {
        let Some(idx) = self.study.trials.iter().position(|t| t.id == done.trial_id) else {
            return Ok(());
        };
        // Already pruned or timed out; the worker's return only frees the pool
        if self.study.trials[idx].state != TrialState::Running {
            return Ok(());
        }

        match done.result {
            Ok(metrics) if metrics.is_finite() => {
                let value = objective.reduce(&metrics);
                self.study.trials[idx].complete(value);
                self.study.update_best(done.trial_id);
                self.consecutive_failures = 0;
            }
            Err(EvalError::Cancelled) => {
                // Cooperative cancellation (stop/timeout), not an evaluator
                // fault; never counts toward the abort threshold
                self.study.trials[idx].fail(SENTINEL_SCORE);
            }
            Ok(_) | Err(_) => {
                self.study.trials[idx].fail(SENTINEL_SCORE);
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.max_consecutive_failures {
                    // Fatal abort; recorded history survives in self.study
                    self.stop.store(true, Ordering::SeqCst);
                    return Err(AfinarError::StudyAborted {
                        study_id: self.study.id.clone(),
                        consecutive_failures: self.consecutive_failures,
                    });
                }
            }
        }
        Ok(())
    }

    /// Per-trial wall-clock budget: exceeded trials are failed (no
    /// comparison judgment was made, so never pruned) and cancelled
    fn enforce_trial_timeouts(&mut self, in_flight: &HashMap<u64, (Instant, Arc<AtomicBool>)>) {
        let Some(budget) = self.config.trial_timeout else { return };
        for (&trial_id, (dispatched, flag)) in in_flight {
            if dispatched.elapsed() < budget {
                continue;
            }
            if let Some(idx) = self.study.trials.iter().position(|t| t.id == trial_id) {
                if self.study.trials[idx].state == TrialState::Running {
                    self.study.trials[idx].fail(SENTINEL_SCORE);
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    fn publish_status(&self, started: Instant, state: StudyState) {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *status = StudyStatus {
            study_id: self.study.id.clone(),
            state,
            counts: self.study.counts(),
            best_value: self.study.best_value(),
            front_size: self.study.pareto_front.len(),
            elapsed: started.elapsed(),
        };
    }
}
