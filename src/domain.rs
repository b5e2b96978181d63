#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use anyhow::{bail, Result as AnyResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::bounds::HostBounds;
use crate::config::AgentConfig;
use crate::logs::LogEmitter;
use crate::metrics::Metrics;
use crate::probes::ProbeStore;
use crate::service::{EngineSettings, LoadService};

/// The two independent load axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
        }
    }

    /// Worker magnitudes realising `value`. CPU gets one full worker per whole core
    /// plus one duty-cycled worker for the remainder; memory gets a single worker.
    pub fn worker_magnitudes(self, value: f64) -> Vec<f64> {
        match self {
            Resource::Cpu => {
                let whole = value.trunc();
                let fraction = value - whole;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let mut magnitudes = vec![1.0; whole as usize];
                if fraction > FRACTION_EPSILON {
                    magnitudes.push(fraction);
                }
                magnitudes
            }
            Resource::Memory => vec![value],
        }
    }

    /// Memory is applied in whole megabytes, never less than one.
    pub fn normalize(self, value: f64) -> f64 {
        match self {
            Resource::Cpu => value,
            Resource::Memory => value.trunc().max(1.0),
        }
    }
}

const FRACTION_EPSILON: f64 = 1e-9;

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Cpu => f.write_str("CPU"),
            Resource::Memory => f.write_str("Memory"),
        }
    }
}

impl FromStr for Resource {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> AnyResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            other => bail!("unsupported resource: {other}"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CpuLoadRequest {
    pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryLoadRequest {
    pub value: u64,
}

fn default_duration() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DynamicCpuLoadRequest {
    pub start_value: f64,
    pub end_value: f64,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub stop_at_end: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DynamicMemoryLoadRequest {
    pub start_value: u64,
    pub end_value: u64,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub stop_at_end: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TerminateRequest {
    #[serde(default)]
    pub seconds: u64,
}

/// Downward-API style pod identity, read once from the environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodInfo {
    pub pod_name: String,
    pub namespace: String,
    pub node_name: String,
    pub host_ip: String,
    pub pod_ip: String,
}

impl PodInfo {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).unwrap_or_else(|| "unknown".to_string());
        Self {
            pod_name: get("POD_NAME"),
            namespace: get("POD_NAMESPACE"),
            node_name: get("NODE_NAME"),
            host_ip: get("HOST_IP"),
            pod_ip: get("POD_IP"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub load: LoadService,
    pub probes: Arc<ProbeStore>,
    pub logs: LogEmitter,
    pub metrics: Metrics,
    pub bounds: HostBounds,
    pub pod: PodInfo,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(config: &AgentConfig, bounds: HostBounds) -> AnyResult<Self> {
        let metrics = Metrics::new()?;
        let load = LoadService::new(EngineSettings::from(config), bounds, metrics.clone());
        Ok(Self {
            load,
            probes: Arc::new(ProbeStore::new(config.readiness, config.liveness)),
            logs: LogEmitter::new(metrics.clone()),
            metrics,
            bounds,
            pod: PodInfo::from_lookup(|key| std::env::var(key).ok()),
            shutdown: Arc::new(Notify::new()),
        })
    }
}
