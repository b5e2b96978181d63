#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Agent configuration: defaults, overridden by environment variables.

use anyhow::{anyhow, Context, Result as AnyResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::probes::ProbeStatus;

/// Startup ramp for one resource type, off unless explicitly enabled.
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapRamp {
    pub enabled: bool,
    pub start: f64,
    pub end: f64,
    pub duration_seconds: u32,
    pub stop_at_end: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    pub bind_address: String,
    pub cpu_worker_path: PathBuf,
    pub memory_worker_path: PathBuf,
    pub termination_grace: Duration,
    pub initial_cpu_load: f64,
    pub initial_memory_load: u64,
    pub cpu_ramp: BootstrapRamp,
    pub memory_ramp: BootstrapRamp,
    pub readiness: ProbeStatus,
    pub liveness: ProbeStatus,
}

/// Worker binaries ship next to the agent binary.
fn sibling_binary(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            cpu_worker_path: sibling_binary("cpu_stress"),
            memory_worker_path: sibling_binary("memory_stress"),
            termination_grace: Duration::from_secs(5),
            initial_cpu_load: 0.0,
            initial_memory_load: 0,
            cpu_ramp: BootstrapRamp {
                enabled: false,
                start: 0.0,
                end: 1.0,
                duration_seconds: 60,
                stop_at_end: true,
            },
            memory_ramp: BootstrapRamp {
                enabled: false,
                start: 50.0,
                end: 256.0,
                duration_seconds: 60,
                stop_at_end: true,
            },
            readiness: ProbeStatus::Ok,
            liveness: ProbeStatus::Ok,
        }
    }
}

/// Reads overrides through a lookup function so tests need not touch the process environment.
pub struct ConfigLoader<F> {
    lookup: F,
}

impl AgentConfig {
    pub fn from_env() -> AnyResult<Self> {
        ConfigLoader::new(|key: &str| std::env::var(key).ok()).load()
    }
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub fn load(&self) -> AnyResult<AgentConfig> {
        let mut config = AgentConfig::default();
        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut AgentConfig) -> AnyResult<()> {
        if let Some(bind) = (self.lookup)("BIND_ADDRESS") {
            config.bind_address = bind;
        }
        if let Some(path) = (self.lookup)("CPU_WORKER_PATH") {
            config.cpu_worker_path = PathBuf::from(path);
        }
        if let Some(path) = (self.lookup)("MEMORY_WORKER_PATH") {
            config.memory_worker_path = PathBuf::from(path);
        }
        if let Some(secs) = self.parsed::<u64>("TERMINATION_GRACE_SECONDS")? {
            config.termination_grace = Duration::from_secs(secs);
        }
        if let Some(cpu) = self.parsed("CPU_REQUESTED")? {
            config.initial_cpu_load = cpu;
        }
        if let Some(mem) = self.parsed("MEMORY_REQUESTED")? {
            config.initial_memory_load = mem;
        }
        self.apply_ramp_overrides(&mut config.cpu_ramp, "CPU")?;
        self.apply_ramp_overrides(&mut config.memory_ramp, "MEMORY")?;
        if let Some(status) = self.parsed("READINESS_STATUS")? {
            config.readiness = status;
        }
        if let Some(status) = self.parsed("LIVENESS_STATUS")? {
            config.liveness = status;
        }
        Ok(())
    }

    fn apply_ramp_overrides(&self, ramp: &mut BootstrapRamp, resource: &str) -> AnyResult<()> {
        if let Some(enabled) = (self.lookup)(&format!("ENABLE_DYNAMIC_{resource}_LOAD")) {
            ramp.enabled = enabled == "true";
        }
        if let Some(start) = self.parsed(&format!("INITIAL_{resource}_LOAD"))? {
            ramp.start = start;
        }
        if let Some(end) = self.parsed(&format!("FINAL_{resource}_LOAD"))? {
            ramp.end = end;
        }
        if let Some(duration) = self.parsed(&format!("{resource}_LOAD_DURATION"))? {
            ramp.duration_seconds = duration;
        }
        if let Some(stop) = (self.lookup)(&format!("STOP_{resource}_LOAD_AT_END")) {
            ramp.stop_at_end = stop == "true";
        }
        Ok(())
    }

    fn parsed<T>(&self, key: &str) -> AnyResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        (self.lookup)(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| anyhow!("{e}"))
                    .with_context(|| format!("invalid {key}: {raw:?}"))
            })
            .transpose()
    }
}
