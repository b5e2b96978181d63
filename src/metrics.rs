#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::domain::Resource;

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub requested_load: GaugeVec,
    pub workers: IntGaugeVec,
    pub ramp_active: IntGaugeVec,
    pub ramp_steps_total: IntCounterVec,
    pub ramp_step_failures_total: IntCounterVec,
    pub synthetic_logs_total: IntCounter,
}

impl Metrics {
    pub fn new() -> AnyResult<Self> {
        let registry = Registry::new();
        let requested_load = GaugeVec::new(
            Opts::new(
                "agent_requested_load",
                "applied load: cores for cpu, megabytes for memory",
            ),
            &["resource"],
        )
        .context("create requested_load")?;
        let workers = IntGaugeVec::new(
            Opts::new("agent_workers", "live worker processes"),
            &["resource"],
        )
        .context("create workers")?;
        let ramp_active = IntGaugeVec::new(
            Opts::new("agent_ramp_active", "1 if a ramp has pending steps"),
            &["resource"],
        )
        .context("create ramp_active")?;
        let ramp_steps_total = IntCounterVec::new(
            Opts::new("agent_ramp_steps_total", "ramp steps applied"),
            &["resource"],
        )
        .context("create ramp_steps_total")?;
        let ramp_step_failures_total = IntCounterVec::new(
            Opts::new("agent_ramp_step_failures_total", "ramp steps that failed"),
            &["resource"],
        )
        .context("create ramp_step_failures_total")?;
        let synthetic_logs_total = IntCounter::with_opts(Opts::new(
            "agent_synthetic_logs_total",
            "synthetic log records written",
        ))
        .context("create synthetic_logs_total")?;

        registry
            .register(Box::new(requested_load.clone()))
            .context("register requested_load")?;
        registry
            .register(Box::new(workers.clone()))
            .context("register workers")?;
        registry
            .register(Box::new(ramp_active.clone()))
            .context("register ramp_active")?;
        registry
            .register(Box::new(ramp_steps_total.clone()))
            .context("register ramp_steps_total")?;
        registry
            .register(Box::new(ramp_step_failures_total.clone()))
            .context("register ramp_step_failures_total")?;
        registry
            .register(Box::new(synthetic_logs_total.clone()))
            .context("register synthetic_logs_total")?;

        for resource in [Resource::Cpu, Resource::Memory] {
            requested_load.with_label_values(&[resource.label()]).set(0.0);
            workers.with_label_values(&[resource.label()]).set(0);
            ramp_active.with_label_values(&[resource.label()]).set(0);
        }

        Ok(Self {
            registry,
            requested_load,
            workers,
            ramp_active,
            ramp_steps_total,
            ramp_step_failures_total,
            synthetic_logs_total,
        })
    }

    pub fn record_applied(&self, resource: Resource, value: f64, workers: usize) {
        self.requested_load
            .with_label_values(&[resource.label()])
            .set(value);
        self.workers
            .with_label_values(&[resource.label()])
            .set(i64::try_from(workers).unwrap_or(i64::MAX));
    }

    pub fn record_ramp_active(&self, resource: Resource, active: bool) {
        self.ramp_active
            .with_label_values(&[resource.label()])
            .set(i64::from(active));
    }

    pub fn record_ramp_step(&self, resource: Resource) {
        self.ramp_steps_total
            .with_label_values(&[resource.label()])
            .inc();
    }

    pub fn record_ramp_failure(&self, resource: Resource) {
        self.ramp_step_failures_total
            .with_label_values(&[resource.label()])
            .inc();
    }

    pub fn record_log(&self) {
        self.synthetic_logs_total.inc();
    }

    pub fn encode_text(&self) -> AnyResult<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf).context("encode metrics")?;
        Ok(buf)
    }
}
