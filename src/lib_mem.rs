#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Memory hold routines run by the `memory_stress` worker.

use anyhow::{bail, Context, Result as AnyResult};
use tokio::time::{sleep, Duration};

const BYTES_PER_MB: usize = 1024 * 1024;
const PAGE: usize = 4096;

/// Allocates `memory_mb` MiB and writes every page so it is resident, not just reserved.
pub fn allocate(memory_mb: u64) -> AnyResult<Vec<u8>> {
    if memory_mb == 0 {
        bail!("memory load must be greater than 0");
    }
    let bytes = usize::try_from(memory_mb)
        .ok()
        .and_then(|mb| mb.checked_mul(BYTES_PER_MB))
        .context("memory load does not fit the address space")?;
    let mut buf = Vec::<u8>::new();
    buf.try_reserve_exact(bytes)
        .with_context(|| format!("reserve {memory_mb}MB"))?;
    buf.resize(bytes, 0xA5);
    for i in (0..bytes).step_by(PAGE) {
        buf[i] = buf[i].wrapping_add(1);
    }
    Ok(buf)
}

/// Keeps `buf` alive and touched until the process is signalled.
pub async fn hold(mut buf: Vec<u8>) {
    loop {
        if !buf.is_empty() {
            buf[0] = buf[0].wrapping_add(1);
        }
        sleep(Duration::from_secs(10)).await;
    }
}
