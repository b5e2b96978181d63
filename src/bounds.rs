#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use serde::Serialize;
use sysinfo::System;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Upper bounds for requested load, read from the host once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HostBounds {
    pub cpu_count: usize,
    pub total_memory_mb: u64,
}

impl HostBounds {
    pub fn new(cpu_count: usize, total_memory_mb: u64) -> Self {
        Self {
            cpu_count,
            total_memory_mb,
        }
    }

    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            cpu_count: num_cpus::get(),
            total_memory_mb: system.total_memory() / BYTES_PER_MB,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn cpu_bound(&self) -> f64 {
        self.cpu_count as f64
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn memory_bound(&self) -> f64 {
        self.total_memory_mb as f64
    }
}

/// Live host figures reported by the system endpoint, in bytes.
#[derive(Clone, Debug, Serialize)]
pub struct SystemInfo {
    pub cpu_count: usize,
    pub memory_total: u64,
    pub memory_available: u64,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            cpu_count: num_cpus::get(),
            memory_total: system.total_memory(),
            memory_available: system.available_memory(),
        }
    }
}
