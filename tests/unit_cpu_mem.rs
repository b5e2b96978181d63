#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::time::Duration;
use workload_injector::{lib_cpu, lib_mem};

#[test]
fn duty_cycle_splits_window() {
    let (on, off) = lib_cpu::duty_cycle(0.25);
    assert_eq!(on, Duration::from_millis(25));
    assert_eq!(off, Duration::from_millis(75));
    assert_eq!(lib_cpu::duty_cycle(1.5), (lib_cpu::SAMPLE_WINDOW, Duration::ZERO));
}

#[test]
fn split_load() {
    let (whole, fraction) = lib_cpu::split_load(2.5);
    assert_eq!(whole, 2);
    assert!((fraction - 0.5).abs() < 1e-9);
}

#[test]
fn burn_rejects_non_positive() {
    assert!(lib_cpu::burn(0.0).is_err());
    assert!(lib_cpu::burn(-2.0).is_err());
}

#[test]
fn mem_allocates() {
    let buf = lib_mem::allocate(1).expect("ok");
    assert_eq!(buf.len(), 1024 * 1024);
    assert!(lib_mem::allocate(0).is_err());
}
