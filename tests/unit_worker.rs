#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use workload_injector::worker;
use workload_injector::AgentError;

fn system_binary(name: &str) -> PathBuf {
    ["/bin", "/usr/bin"]
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|p| p.exists())
        .expect("coreutils binary")
}

fn stubborn_script() -> PathBuf {
    let path = std::env::temp_dir().join(format!("stubborn-worker-{}.sh", std::process::id()));
    std::fs::write(&path, "#!/bin/sh\ntrap '' TERM\nwhile true; do sleep 0.1; done\n")
        .expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

#[tokio::test]
async fn sigterm_stops_cooperative_worker() {
    let handle = worker::spawn(&system_binary("sleep"), 30.0).expect("spawn");
    assert!(handle.pid() > 0);
    assert!((handle.magnitude() - 30.0).abs() < f64::EPSILON);

    let status = worker::terminate(handle, Duration::from_secs(2))
        .await
        .expect("terminated");
    assert_eq!(status.signal(), Some(15));
}

#[tokio::test]
async fn ignored_sigterm_escalates_to_sigkill() {
    let script = stubborn_script();
    let handle = worker::spawn(&script, 1.0).expect("spawn");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = worker::terminate(handle, Duration::from_millis(100))
        .await
        .expect("killed");
    assert_eq!(status.signal(), Some(9));
    let _ = std::fs::remove_file(script);
}

#[tokio::test]
async fn exited_worker_terminates_cleanly() {
    let handle = worker::spawn(&system_binary("true"), 1.0).expect("spawn");
    tokio::time::sleep(Duration::from_millis(300)).await;
    let status = worker::terminate(handle, Duration::from_secs(1))
        .await
        .expect("already gone");
    assert!(status.success());
}

#[test]
fn missing_program_is_launch_error() {
    let err = worker::spawn(Path::new("/nonexistent/worker"), 1.0).unwrap_err();
    assert!(matches!(err, AgentError::WorkerLaunch(_)));
}
