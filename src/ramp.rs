#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Time-boxed ramps: a start value, an end value and a duration cut into fixed
//! ten-second intervals, one load change per interval.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::coordinator::Coordinator;

/// Width of one ramp interval. The number of steps is always derived from it.
pub const STEP_GRANULARITY_SECONDS: u32 = 10;

/// Wall-clock spacing between two steps in production.
pub const STEP_INTERVAL: Duration = Duration::from_secs(STEP_GRANULARITY_SECONDS as u64);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RampSpec {
    pub start: f64,
    pub end: f64,
    pub duration_seconds: u32,
    pub stop_at_end: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RampPlan {
    spec: RampSpec,
    steps: usize,
    increment: f64,
}

impl RampPlan {
    pub fn new(spec: RampSpec) -> Self {
        let steps = (spec.duration_seconds / STEP_GRANULARITY_SECONDS).max(1) as usize;
        #[allow(clippy::cast_precision_loss)]
        let increment = (spec.end - spec.start) / steps as f64;
        Self {
            spec,
            steps,
            increment,
        }
    }

    pub fn spec(&self) -> &RampSpec {
        &self.spec
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn increment(&self) -> f64 {
        self.increment
    }

    /// Value applied by step `k` (0-indexed), never past the end value.
    #[allow(clippy::cast_precision_loss)]
    pub fn value_at(&self, step: usize) -> f64 {
        (self.spec.start + self.increment * (step + 1) as f64).min(self.spec.end)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.steps).map(|k| self.value_at(k))
    }

    /// Whether anything is left to do once step 0 has been applied.
    pub fn needs_schedule(&self) -> bool {
        self.steps > 1 || self.spec.stop_at_end
    }
}

/// Drives steps `1..` of `plan`, one per `interval` counted from `started`, then the
/// optional final stop. Step 0 has already been applied by the caller. A slow step
/// delays the next tick instead of shifting the whole schedule. Exits early once
/// `generation` is no longer the coordinator's current ramp.
pub(crate) async fn drive(
    coordinator: Coordinator,
    plan: RampPlan,
    generation: u64,
    started: Instant,
    interval: Duration,
) {
    let mut ticker = interval_at(started + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    for step in 1..plan.steps() {
        ticker.tick().await;
        if !coordinator.ramp_step(generation, step, plan.value_at(step)).await {
            debug!(resource = coordinator.resource().label(), generation, step, "ramp superseded");
            return;
        }
    }
    if plan.spec().stop_at_end {
        ticker.tick().await;
    }
    coordinator
        .finish_ramp(generation, plan.spec().stop_at_end)
        .await;
}
