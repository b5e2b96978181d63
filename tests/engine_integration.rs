#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use workload_injector::{
    AgentError, EngineSettings, HostBounds, LoadService, LoadStatus, Metrics,
};

const STEP: Duration = Duration::from_millis(300);

fn settings() -> EngineSettings {
    EngineSettings {
        cpu_program: PathBuf::from(env!("CARGO_BIN_EXE_cpu_stress")),
        memory_program: PathBuf::from(env!("CARGO_BIN_EXE_memory_stress")),
        termination_grace: Duration::from_secs(2),
        step_interval: STEP,
    }
}

/// A worker that ignores SIGTERM, so every stop runs the full grace period.
fn stubborn_worker(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "stubborn-{tag}-{}.sh",
        std::process::id()
    ));
    std::fs::write(&path, "#!/bin/sh\ntrap '' TERM\nwhile true; do sleep 0.1; done\n")
        .expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn service_with(settings: EngineSettings, bounds: HostBounds) -> (LoadService, Metrics) {
    let metrics = Metrics::new().expect("metrics");
    (LoadService::new(settings, bounds, metrics.clone()), metrics)
}

fn service(bounds: HostBounds) -> LoadService {
    service_with(settings(), bounds).0
}

async fn wait_for(svc: &LoadService, pred: impl Fn(&LoadStatus) -> bool) -> LoadStatus {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let st = svc.status().await;
        if pred(&st) || Instant::now() > deadline {
            return st;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn stop_without_workers_is_noop() {
    let svc = service(HostBounds::new(4, 1024));
    svc.stop_cpu_load().await.expect("cpu stop");
    svc.stop_memory_load().await.expect("memory stop");
    let st = svc.status().await;
    assert!(st.cpu_requested.abs() < f64::EPSILON);
    assert_eq!(st.memory_requested, 0);
    assert!(!st.cpu_active && !st.memory_active);
}

#[tokio::test]
async fn cpu_load_replaces_previous_workers() {
    let svc = service(HostBounds::new(4, 1024));
    svc.add_cpu_load(1.5).await.expect("first");
    assert_eq!(svc.status().await.cpu_workers, 2);

    svc.add_cpu_load(0.5).await.expect("second");
    let st = svc.status().await;
    assert_eq!(st.cpu_workers, 1);
    assert!((st.cpu_requested - 0.5).abs() < f64::EPSILON);
    assert!(st.cpu_active);

    svc.stop_cpu_load().await.expect("stop");
    let st = svc.status().await;
    assert_eq!(st.cpu_workers, 0);
    assert!(st.cpu_requested.abs() < f64::EPSILON);
}

#[tokio::test]
async fn memory_bound_rejection() {
    let svc = service(HostBounds::new(4, 64));
    let err = svc.add_memory_load(65).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(!svc.status().await.memory_active);

    assert_eq!(svc.add_memory_load(64).await.expect("at bound"), 64);
    let st = svc.status().await;
    assert_eq!(st.memory_requested, 64);
    assert!(st.memory_active);
    svc.stop_memory_load().await.expect("stop");
    assert!(!svc.status().await.memory_active);
}

#[tokio::test]
async fn cpu_above_core_count_spawns_nothing() {
    let svc = service(HostBounds::new(2, 1024));
    assert!(matches!(
        svc.add_cpu_load(2.5).await,
        Err(AgentError::Validation(_))
    ));
    assert_eq!(svc.status().await.cpu_workers, 0);
}

#[tokio::test]
async fn cpu_ramp_converges_and_holds() {
    let svc = service(HostBounds::new(16, 1024));
    let accepted = svc.dynamic_cpu_load(2.0, 10.0, 30, false).await.expect("ramp");
    assert_eq!(accepted.steps, 3);
    let first = svc.status().await;
    assert!(first.cpu_requested > 2.0 && first.cpu_requested < 10.0);
    assert!(first.cpu_ramp.is_some());

    let st = wait_for(&svc, |s| s.cpu_ramp.is_none()).await;
    assert!(st.cpu_ramp.is_none(), "ramp never finished");
    assert!((st.cpu_requested - 10.0).abs() < 1e-9);

    sleep(STEP * 2).await;
    let st = svc.status().await;
    assert!((st.cpu_requested - 10.0).abs() < 1e-9);
    assert_eq!(st.cpu_workers, 10);
    svc.stop_cpu_load().await.expect("stop");
}

#[tokio::test]
async fn memory_ramp_stops_at_end() {
    let svc = service(HostBounds::new(4, 4096));
    let accepted = svc.dynamic_memory_load(100, 200, 10, true).await.expect("ramp");
    assert_eq!(accepted.steps, 1);
    let st = svc.status().await;
    assert_eq!(st.memory_requested, 200);
    assert!(st.memory_ramp.is_some());

    let st = wait_for(&svc, |s| !s.memory_active).await;
    assert_eq!(st.memory_requested, 0);
    assert!(!st.memory_active);
    assert!(st.memory_ramp.is_none());
}

#[tokio::test]
async fn flat_short_ramp_applies_once() {
    let (svc, metrics) = service_with(settings(), HostBounds::new(8, 1024));
    let accepted = svc.dynamic_cpu_load(5.0, 5.0, 1, false).await.expect("ramp");
    assert_eq!(accepted.steps, 1);
    let st = svc.status().await;
    assert!((st.cpu_requested - 5.0).abs() < f64::EPSILON);
    assert_eq!(st.cpu_workers, 5);
    assert!(st.cpu_ramp.is_none());

    sleep(STEP * 2).await;
    assert_eq!(metrics.ramp_steps_total.with_label_values(&["cpu"]).get(), 1);
    svc.stop_cpu_load().await.expect("stop");
}

#[tokio::test]
async fn descending_ramp_rejected_without_side_effects() {
    let svc = service(HostBounds::new(8, 1024));
    assert!(matches!(
        svc.dynamic_cpu_load(3.0, 2.0, 30, false).await,
        Err(AgentError::Validation(_))
    ));
    assert!(svc.dynamic_memory_load(200, 100, 30, false).await.is_err());
    assert!(svc.dynamic_memory_load(100, 200, 0, false).await.is_err());
    let st = svc.status().await;
    assert!(!st.cpu_active && !st.memory_active);
    assert!(st.cpu_ramp.is_none() && st.memory_ramp.is_none());
}

#[tokio::test]
async fn stop_cancels_pending_ramp_steps() {
    let svc = service(HostBounds::new(8, 1024));
    svc.dynamic_cpu_load(1.0, 3.0, 30, false).await.expect("ramp");
    svc.stop_cpu_load().await.expect("stop");

    sleep(STEP * 4).await;
    let st = svc.status().await;
    assert!(st.cpu_requested.abs() < f64::EPSILON);
    assert_eq!(st.cpu_workers, 0);
    assert!(st.cpu_ramp.is_none());
}

#[tokio::test]
async fn direct_set_overrides_ramp() {
    let svc = service(HostBounds::new(8, 1024));
    svc.dynamic_cpu_load(1.0, 3.0, 30, false).await.expect("ramp");
    svc.add_cpu_load(0.5).await.expect("set");

    sleep(STEP * 4).await;
    let st = svc.status().await;
    assert!((st.cpu_requested - 0.5).abs() < f64::EPSILON);
    assert!(st.cpu_ramp.is_none());
    svc.stop_cpu_load().await.expect("stop");
}

#[tokio::test]
async fn new_ramp_supersedes_old_one() {
    let svc = service(HostBounds::new(4, 1024));
    svc.dynamic_memory_load(10, 40, 30, true).await.expect("first");
    svc.dynamic_memory_load(5, 5, 1, false).await.expect("second");

    sleep(STEP * 5).await;
    let st = svc.status().await;
    assert_eq!(st.memory_requested, 5);
    assert!(st.memory_active);
    assert!(st.memory_ramp.is_none());
    svc.stop_memory_load().await.expect("stop");
}

#[tokio::test]
async fn missing_worker_executable() {
    let mut s = settings();
    s.cpu_program = PathBuf::from("/nonexistent/cpu_stress");
    let (svc, metrics) = service_with(s, HostBounds::new(4, 1024));

    let err = svc.add_cpu_load(1.0).await.unwrap_err();
    assert!(matches!(err, AgentError::WorkerLaunch(_)));
    assert!(!err.is_client_error());
    assert!(svc.status().await.cpu_requested.abs() < f64::EPSILON);

    // a failed step does not abort the ramp
    svc.dynamic_cpu_load(1.0, 2.0, 20, false).await.expect("accepted");
    let st = wait_for(&svc, |s| s.cpu_ramp.is_none()).await;
    assert!(st.cpu_ramp.is_none());
    assert_eq!(
        metrics.ramp_step_failures_total.with_label_values(&["cpu"]).get(),
        2
    );
}

#[tokio::test]
async fn shutdown_tears_down_everything() {
    let svc = service(HostBounds::new(4, 1024));
    svc.add_cpu_load(0.2).await.expect("cpu");
    svc.dynamic_memory_load(1, 4, 40, false).await.expect("memory ramp");
    svc.shutdown().await;
    let st = svc.status().await;
    assert!(!st.cpu_active && !st.memory_active);
    assert!(st.memory_ramp.is_none());
}

#[tokio::test]
async fn dropped_request_still_completes() {
    let mut s = settings();
    s.cpu_program = stubborn_worker("dropped");
    s.termination_grace = Duration::from_secs(2);
    let svc = service_with(s, HostBounds::new(4, 1024)).0;

    svc.add_cpu_load(1.0).await.expect("first");
    let dropped = timeout(Duration::from_millis(200), svc.add_cpu_load(2.0)).await;
    assert!(dropped.is_err(), "replacement should still be waiting on the grace period");

    // status waits for the replacement, which keeps running without its caller
    let st = svc.status().await;
    assert!((st.cpu_requested - 2.0).abs() < f64::EPSILON);
    assert_eq!(st.cpu_workers, 2);
    assert!(st.cpu_active);

    svc.stop_cpu_load().await.expect("stop");
    let st = svc.status().await;
    assert!(st.cpu_requested.abs() < f64::EPSILON);
    assert_eq!(st.cpu_workers, 0);
}

#[tokio::test]
async fn cpu_value_too_small_for_a_worker() {
    let svc = service(HostBounds::new(4, 1024));
    assert!(matches!(
        svc.add_cpu_load(1e-12).await,
        Err(AgentError::Validation(_))
    ));
    let st = svc.status().await;
    assert!(st.cpu_requested.abs() < f64::EPSILON);
    assert!(!st.cpu_active);
}

#[tokio::test]
async fn tiny_ramp_steps_keep_status_consistent() {
    let svc = service(HostBounds::new(4, 1024));
    // 360 steps of ~3e-11 cores: early steps are too small for any worker
    svc.dynamic_cpu_load(0.0, 1e-8, 3600, false).await.expect("ramp");
    let st = svc.status().await;
    assert!(st.cpu_requested.abs() < f64::EPSILON);
    assert_eq!(st.cpu_workers, 0);
    assert!(st.cpu_ramp.is_some());
    svc.stop_cpu_load().await.expect("stop");
    assert!(svc.status().await.cpu_ramp.is_none());
}

#[tokio::test]
async fn slow_steps_do_not_stretch_the_schedule() {
    let mut s = settings();
    s.cpu_program = stubborn_worker("cadence");
    s.termination_grace = Duration::from_millis(400);
    s.step_interval = Duration::from_millis(500);
    let svc = service_with(s, HostBounds::new(8, 1024)).0;

    // five steps, four of them scheduled; each replacement burns the 400ms grace
    let started = Instant::now();
    svc.dynamic_cpu_load(1.0, 5.0, 50, false).await.expect("ramp");
    let st = wait_for(&svc, |s| s.cpu_ramp.is_none()).await;
    let elapsed = started.elapsed();

    assert!((st.cpu_requested - 5.0).abs() < 1e-9);
    assert!(
        elapsed < Duration::from_millis(3100),
        "ramp took {elapsed:?}, steps drifted by their own duration"
    );
    svc.stop_cpu_load().await.expect("stop");
}
