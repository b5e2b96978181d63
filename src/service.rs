#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use crate::bounds::HostBounds;
use crate::config::{AgentConfig, BootstrapRamp};
use crate::coordinator::{Coordinator, CoordinatorSettings, RampAccepted, RampProgress};
use crate::domain::Resource;
use crate::error::AgentResult;
use crate::metrics::Metrics;
use crate::ramp::{RampSpec, STEP_INTERVAL};

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub cpu_program: PathBuf,
    pub memory_program: PathBuf,
    pub termination_grace: Duration,
    pub step_interval: Duration,
}

impl From<&AgentConfig> for EngineSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            cpu_program: config.cpu_worker_path.clone(),
            memory_program: config.memory_worker_path.clone(),
            termination_grace: config.termination_grace,
            step_interval: STEP_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadStatus {
    pub cpu_requested: f64,
    pub memory_requested: u64,
    pub cpu_active: bool,
    pub memory_active: bool,
    pub cpu_workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_ramp: Option<RampProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_ramp: Option<RampProgress>,
}

/// Entry point for every load operation: one coordinator per resource type.
#[derive(Clone)]
pub struct LoadService {
    cpu: Coordinator,
    memory: Coordinator,
    bounds: HostBounds,
}

impl LoadService {
    pub fn new(settings: EngineSettings, bounds: HostBounds, metrics: Metrics) -> Self {
        let cpu = Coordinator::new(
            Resource::Cpu,
            CoordinatorSettings {
                program: settings.cpu_program,
                bound: bounds.cpu_bound(),
                termination_grace: settings.termination_grace,
                step_interval: settings.step_interval,
            },
            metrics.clone(),
        );
        let memory = Coordinator::new(
            Resource::Memory,
            CoordinatorSettings {
                program: settings.memory_program,
                bound: bounds.memory_bound(),
                termination_grace: settings.termination_grace,
                step_interval: settings.step_interval,
            },
            metrics,
        );
        Self {
            cpu,
            memory,
            bounds,
        }
    }

    pub fn bounds(&self) -> HostBounds {
        self.bounds
    }

    pub async fn add_cpu_load(&self, value: f64) -> AgentResult<f64> {
        self.cpu.apply(value).await
    }

    pub async fn stop_cpu_load(&self) -> AgentResult<()> {
        self.cpu.stop().await
    }

    pub async fn dynamic_cpu_load(
        &self,
        start: f64,
        end: f64,
        duration_seconds: u32,
        stop_at_end: bool,
    ) -> AgentResult<RampAccepted> {
        self.cpu
            .start_ramp(RampSpec {
                start,
                end,
                duration_seconds,
                stop_at_end,
            })
            .await
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub async fn add_memory_load(&self, value_mb: u64) -> AgentResult<u64> {
        let applied = self.memory.apply(value_mb as f64).await?;
        Ok(applied as u64)
    }

    pub async fn stop_memory_load(&self) -> AgentResult<()> {
        self.memory.stop().await
    }

    #[allow(clippy::cast_precision_loss)]
    pub async fn dynamic_memory_load(
        &self,
        start_mb: u64,
        end_mb: u64,
        duration_seconds: u32,
        stop_at_end: bool,
    ) -> AgentResult<RampAccepted> {
        self.memory
            .start_ramp(RampSpec {
                start: start_mb as f64,
                end: end_mb as f64,
                duration_seconds,
                stop_at_end,
            })
            .await
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub async fn status(&self) -> LoadStatus {
        let cpu = self.cpu.snapshot().await;
        let memory = self.memory.snapshot().await;
        LoadStatus {
            cpu_requested: cpu.requested,
            memory_requested: memory.requested as u64,
            cpu_active: cpu.workers > 0,
            memory_active: memory.workers > 0,
            cpu_workers: cpu.workers,
            cpu_ramp: cpu.ramp,
            memory_ramp: memory.ramp,
        }
    }

    /// Applies the startup loads and ramps from the environment. Failures are logged, not fatal.
    pub async fn bootstrap(&self, config: &AgentConfig) {
        if config.initial_cpu_load > 0.0 {
            if let Err(e) = self.add_cpu_load(config.initial_cpu_load).await {
                error!(error = %e, "initial cpu load rejected");
            }
        }
        if config.initial_memory_load > 0 {
            if let Err(e) = self.add_memory_load(config.initial_memory_load).await {
                error!(error = %e, "initial memory load rejected");
            }
        }
        self.bootstrap_ramp(Resource::Memory, &config.memory_ramp).await;
        self.bootstrap_ramp(Resource::Cpu, &config.cpu_ramp).await;
    }

    async fn bootstrap_ramp(&self, resource: Resource, ramp: &BootstrapRamp) {
        if !ramp.enabled {
            return;
        }
        let coordinator = match resource {
            Resource::Cpu => &self.cpu,
            Resource::Memory => &self.memory,
        };
        let spec = RampSpec {
            start: ramp.start,
            end: ramp.end,
            duration_seconds: ramp.duration_seconds,
            stop_at_end: ramp.stop_at_end,
        };
        match coordinator.start_ramp(spec).await {
            Ok(accepted) => info!(
                resource = resource.label(),
                steps = accepted.steps,
                "bootstrap ramp started"
            ),
            Err(e) => error!(
                resource = resource.label(),
                error = %e,
                "bootstrap ramp rejected"
            ),
        }
    }

    /// Stops both resource types. Called once when the agent shuts down.
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop_cpu_load().await {
            error!(error = %e, "cpu workers left behind at shutdown");
        }
        if let Err(e) = self.stop_memory_load().await {
            error!(error = %e, "memory worker left behind at shutdown");
        }
        info!("load workers torn down");
    }
}
