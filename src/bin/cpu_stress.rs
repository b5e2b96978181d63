#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use tracing::info;
use workload_injector::lib_cpu;

fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();
    let raw = std::env::args()
        .nth(1)
        .context("usage: cpu_stress <cpu_load>, e.g. 2.5 for two cores plus half of a third")?;
    let load: f64 = raw
        .parse()
        .with_context(|| format!("invalid cpu load: {raw:?}"))?;
    let (whole, fraction) = lib_cpu::split_load(load);
    info!(load, whole, fraction, pid = std::process::id(), "cpu worker started");
    lib_cpu::burn(load)
}
