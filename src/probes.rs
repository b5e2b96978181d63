#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use anyhow::{bail, Result as AnyResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Probe {
    Readiness,
    Liveness,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Error,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Ok => f.write_str("ok"),
            ProbeStatus::Error => f.write_str("error"),
        }
    }
}

impl FromStr for ProbeStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> AnyResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ok" | "success" => Ok(Self::Ok),
            "error" | "failure" => Ok(Self::Error),
            other => bail!("unsupported probe status: {other}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub probe: Probe,
    pub status: ProbeStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeStatuses {
    pub readiness_status: ProbeStatus,
    pub liveness_status: ProbeStatus,
}

/// Readiness and liveness flags served to the orchestrator.
#[derive(Debug)]
pub struct ProbeStore {
    readiness: Mutex<ProbeStatus>,
    liveness: Mutex<ProbeStatus>,
}

impl ProbeStore {
    pub fn new(readiness: ProbeStatus, liveness: ProbeStatus) -> Self {
        Self {
            readiness: Mutex::new(readiness),
            liveness: Mutex::new(liveness),
        }
    }

    pub fn get(&self, probe: Probe) -> ProbeStatus {
        match probe {
            Probe::Readiness => *self.readiness.lock(),
            Probe::Liveness => *self.liveness.lock(),
        }
    }

    pub fn set(&self, probe: Probe, status: ProbeStatus) {
        match probe {
            Probe::Readiness => *self.readiness.lock() = status,
            Probe::Liveness => *self.liveness.lock() = status,
        }
    }

    pub fn statuses(&self) -> ProbeStatuses {
        ProbeStatuses {
            readiness_status: self.get(Probe::Readiness),
            liveness_status: self.get(Probe::Liveness),
        }
    }
}
