#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use tracing::info;
use workload_injector::lib_mem;

#[tokio::main(flavor = "current_thread")]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();
    let raw = std::env::args()
        .nth(1)
        .context("usage: memory_stress <memory_in_mb>")?;
    let memory_mb: u64 = raw
        .parse()
        .with_context(|| format!("invalid memory load: {raw:?}"))?;
    let buf = lib_mem::allocate(memory_mb)?;
    info!(memory_mb, pid = std::process::id(), "memory worker holding allocation");
    lib_mem::hold(buf).await;
    Ok(())
}
