#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! One coordinator per resource type. Direct sets, stops, ramp steps and ramp
//! cancellation all run under the same mutex, so a stop can never be undone by a
//! ramp step that was already queued. Each operation runs on its own task, so a
//! caller that goes away mid-operation never leaves the state half updated.

use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::Resource;
use crate::error::{AgentError, AgentResult};
use crate::metrics::Metrics;
use crate::ramp::{self, RampPlan, RampSpec};
use crate::validation::{validate_magnitude, validate_ramp};
use crate::worker::{self, WorkerHandle};

#[derive(Clone, Debug)]
pub struct CoordinatorSettings {
    pub program: PathBuf,
    pub bound: f64,
    pub termination_grace: Duration,
    pub step_interval: Duration,
}

struct RampHandle {
    generation: u64,
    task: JoinHandle<()>,
    steps_total: usize,
    steps_applied: usize,
    stop_at_end: bool,
}

#[derive(Default)]
struct ResourceState {
    requested: f64,
    workers: Vec<WorkerHandle>,
    ramp: Option<RampHandle>,
    next_generation: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RampProgress {
    pub steps_total: usize,
    pub steps_applied: usize,
    pub stop_at_end: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub requested: f64,
    pub workers: usize,
    pub ramp: Option<RampProgress>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RampAccepted {
    pub steps: usize,
    pub increment: f64,
    pub first_value: f64,
}

#[derive(Clone)]
pub struct Coordinator {
    resource: Resource,
    settings: Arc<CoordinatorSettings>,
    state: Arc<Mutex<ResourceState>>,
    metrics: Metrics,
}

impl Coordinator {
    pub fn new(resource: Resource, settings: CoordinatorSettings, metrics: Metrics) -> Self {
        Self {
            resource,
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(ResourceState::default())),
            metrics,
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Replace whatever runs now with workers for `value`.
    pub async fn apply(&self, value: f64) -> AgentResult<f64> {
        validate_magnitude(self.resource, value, self.settings.bound)?;
        let this = self.clone();
        detached(async move {
            let mut state = this.state.lock().await;
            this.cancel_ramp(&mut state);
            this.replace_workers(&mut state, value).await
        })
        .await
    }

    pub async fn stop(&self) -> AgentResult<()> {
        let this = self.clone();
        detached(async move {
            let mut state = this.state.lock().await;
            this.cancel_ramp(&mut state);
            this.stop_workers(&mut state).await?;
            info!(resource = this.resource.label(), "load stopped");
            Ok(())
        })
        .await
    }

    /// Validate, apply step 0 right away and schedule the rest.
    pub async fn start_ramp(&self, spec: RampSpec) -> AgentResult<RampAccepted> {
        validate_ramp(self.resource, &spec, self.settings.bound)?;
        let this = self.clone();
        detached(async move { this.begin_ramp(spec).await }).await
    }

    async fn begin_ramp(&self, spec: RampSpec) -> AgentResult<RampAccepted> {
        let plan = RampPlan::new(spec);
        let first_value = self.resource.normalize(plan.value_at(0));

        let mut state = self.state.lock().await;
        self.cancel_ramp(&mut state);
        let generation = state.next_generation;
        state.next_generation += 1;
        info!(
            resource = self.resource.label(),
            start = spec.start,
            end = spec.end,
            duration = spec.duration_seconds,
            stop_at_end = spec.stop_at_end,
            steps = plan.steps(),
            "ramp started"
        );

        let started = Instant::now();
        self.run_step(&mut state, 0, first_value).await;
        if plan.needs_schedule() {
            let task = tokio::spawn(ramp::drive(
                self.clone(),
                plan,
                generation,
                started,
                self.settings.step_interval,
            ));
            state.ramp = Some(RampHandle {
                generation,
                task,
                steps_total: plan.steps(),
                steps_applied: 1,
                stop_at_end: spec.stop_at_end,
            });
            self.metrics.record_ramp_active(self.resource, true);
        }
        Ok(RampAccepted {
            steps: plan.steps(),
            increment: plan.increment(),
            first_value,
        })
    }

    pub async fn snapshot(&self) -> ResourceSnapshot {
        let state = self.state.lock().await;
        ResourceSnapshot {
            requested: state.requested,
            workers: state.workers.len(),
            ramp: state.ramp.as_ref().map(|r| RampProgress {
                steps_total: r.steps_total,
                steps_applied: r.steps_applied,
                stop_at_end: r.stop_at_end,
            }),
        }
    }

    /// Step `step` of ramp `generation`. Returns false once that ramp has been superseded.
    pub(crate) async fn ramp_step(&self, generation: u64, step: usize, value: f64) -> bool {
        let mut state = self.state.lock().await;
        if !Self::is_current(&state, generation) {
            return false;
        }
        self.run_step(&mut state, step, self.resource.normalize(value))
            .await;
        if let Some(ramp) = state.ramp.as_mut() {
            ramp.steps_applied = step + 1;
        }
        true
    }

    /// Natural end of ramp `generation`: forget it and optionally stop the load.
    pub(crate) async fn finish_ramp(&self, generation: u64, stop_at_end: bool) {
        let mut state = self.state.lock().await;
        if !Self::is_current(&state, generation) {
            return;
        }
        // dropping our own handle detaches it, aborting would cancel the stop below
        state.ramp = None;
        self.metrics.record_ramp_active(self.resource, false);
        info!(resource = self.resource.label(), generation, "ramp completed");
        if stop_at_end {
            if let Err(e) = self.stop_workers(&mut state).await {
                error!(resource = self.resource.label(), error = %e, "stop at end of ramp failed");
            }
        }
    }

    fn is_current(state: &ResourceState, generation: u64) -> bool {
        state
            .ramp
            .as_ref()
            .is_some_and(|r| r.generation == generation)
    }

    /// A failed step is logged and counted, the ramp goes on with the next one.
    async fn run_step(&self, state: &mut ResourceState, step: usize, value: f64) {
        match self.replace_workers(state, value).await {
            Ok(_) => {
                self.metrics.record_ramp_step(self.resource);
                debug!(resource = self.resource.label(), step, value, "ramp step applied");
            }
            Err(e) => {
                self.metrics.record_ramp_failure(self.resource);
                warn!(resource = self.resource.label(), step, value, error = %e, "ramp step failed");
            }
        }
    }

    fn cancel_ramp(&self, state: &mut ResourceState) {
        if let Some(ramp) = state.ramp.take() {
            ramp.task.abort();
            self.metrics.record_ramp_active(self.resource, false);
            info!(
                resource = self.resource.label(),
                generation = ramp.generation,
                steps_applied = ramp.steps_applied,
                steps_total = ramp.steps_total,
                "pending ramp steps cancelled"
            );
        }
    }

    async fn replace_workers(&self, state: &mut ResourceState, value: f64) -> AgentResult<f64> {
        self.stop_workers(state).await?;

        let magnitudes = self.resource.worker_magnitudes(value);
        if magnitudes.is_empty() {
            // only reachable from a ramp step too small to run a worker
            debug!(resource = self.resource.label(), value, "value below one worker, load cleared");
            return Ok(0.0);
        }
        let mut spawned = Vec::with_capacity(magnitudes.len());
        for magnitude in magnitudes {
            match worker::spawn(&self.settings.program, magnitude) {
                Ok(handle) => spawned.push(handle),
                Err(e) => {
                    for orphan in spawned {
                        if let Err(failure) =
                            worker::terminate(orphan, self.settings.termination_grace).await
                        {
                            error!(
                                pid = failure.handle.pid(),
                                reason = %failure.reason,
                                "could not reap worker from failed launch"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        let pids: Vec<u32> = spawned.iter().map(WorkerHandle::pid).collect();
        state.workers = spawned;
        state.requested = value;
        self.metrics
            .record_applied(self.resource, value, state.workers.len());
        info!(resource = self.resource.label(), value, ?pids, "load applied");
        Ok(value)
    }

    /// Terminates every tracked worker. Workers confirmed dead are forgotten; the
    /// rest stay tracked and are reported.
    async fn stop_workers(&self, state: &mut ResourceState) -> AgentResult<()> {
        if state.workers.is_empty() {
            state.requested = 0.0;
            return Ok(());
        }
        let grace = self.settings.termination_grace;
        let workers = std::mem::take(&mut state.workers);
        let results = join_all(workers.into_iter().map(|w| worker::terminate(w, grace))).await;

        let mut reasons = Vec::new();
        for result in results {
            if let Err(failure) = result {
                reasons.push(format!("{}: {}", failure.handle.pid(), failure.reason));
                state.workers.push(failure.handle);
            }
        }
        if state.workers.is_empty() {
            state.requested = 0.0;
            self.metrics.record_applied(self.resource, 0.0, 0);
            return Ok(());
        }

        self.metrics
            .record_applied(self.resource, state.requested, state.workers.len());
        Err(AgentError::Termination {
            failed: state.workers.iter().map(WorkerHandle::pid).collect(),
            reason: reasons.join("; "),
        })
    }
}

/// Runs a state-changing operation on its own task so that dropping the caller
/// (a client hanging up mid-request) cannot leave the state half updated.
async fn detached<T, F>(operation: F) -> AgentResult<T>
where
    T: Send + 'static,
    F: Future<Output = AgentResult<T>> + Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| AgentError::Interrupted(e.to_string()))?
}
