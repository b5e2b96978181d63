#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! CPU burn routines run by the `cpu_stress` worker.

use anyhow::{bail, Context, Result as AnyResult};
use std::thread;
use std::time::{Duration, Instant};

/// Sampling window of the fractional burner: busy for a share of it, asleep for the rest.
pub const SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// Busy and idle time within one [`SAMPLE_WINDOW`] for a load fraction in `[0, 1]`.
pub fn duty_cycle(fraction: f64) -> (Duration, Duration) {
    let on = SAMPLE_WINDOW.mul_f64(fraction.clamp(0.0, 1.0));
    (on, SAMPLE_WINDOW.saturating_sub(on))
}

/// Whole cores to saturate and the remaining fraction for `load`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn split_load(load: f64) -> (usize, f64) {
    let whole = load.trunc();
    (whole as usize, load - whole)
}

fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

fn burn_full() {
    loop {
        std::hint::spin_loop();
    }
}

fn burn_fraction(fraction: f64) {
    let (on, off) = duty_cycle(fraction);
    loop {
        spin_until(Instant::now() + on);
        thread::sleep(off);
    }
}

/// Burns `load` cores until the process is signalled. Only returns on error.
pub fn burn(load: f64) -> AnyResult<()> {
    if !load.is_finite() || load <= 0.0 {
        bail!("cpu load must be greater than 0, got {load}");
    }
    let (whole, fraction) = split_load(load);
    let mut burners = Vec::with_capacity(whole + 1);
    for i in 0..whole {
        let burner = thread::Builder::new()
            .name(format!("burn-{i}"))
            .spawn(burn_full)
            .context("spawn full burner")?;
        burners.push(burner);
    }
    if fraction > 0.0 {
        let burner = thread::Builder::new()
            .name("burn-fraction".to_string())
            .spawn(move || burn_fraction(fraction))
            .context("spawn fractional burner")?;
        burners.push(burner);
    }
    for burner in burners {
        if burner.join().is_err() {
            bail!("burner thread panicked");
        }
    }
    Ok(())
}
