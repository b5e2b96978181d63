#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{AgentError, AgentResult};

/// How long a worker gets to die after SIGKILL before we give up on it.
pub const KILL_WAIT: Duration = Duration::from_secs(5);

/// A spawned worker process. It leads its own process group, so `pid` is also the group id.
#[derive(Debug)]
pub struct WorkerHandle {
    child: Child,
    pid: u32,
    magnitude: f64,
    started_at: DateTime<Utc>,
}

impl WorkerHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn group(&self) -> Option<Pid> {
        i32::try_from(self.pid).ok().map(Pid::from_raw)
    }
}

/// A worker that survived both signals. The handle is handed back so the caller keeps tracking it.
#[derive(Debug)]
pub struct TerminateFailure {
    pub handle: WorkerHandle,
    pub reason: String,
}

/// Start `program <magnitude>` in a new process group.
pub fn spawn(program: &Path, magnitude: f64) -> AgentResult<WorkerHandle> {
    if !program.exists() {
        return Err(AgentError::WorkerLaunch(format!(
            "worker executable not found: {}",
            program.display()
        )));
    }
    let child = Command::new(program)
        .arg(magnitude.to_string())
        .process_group(0)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AgentError::WorkerLaunch(format!("spawn {}: {e}", program.display())))?;
    let pid = child.id().ok_or_else(|| {
        AgentError::WorkerLaunch(format!("{} exited before it could be tracked", program.display()))
    })?;
    debug!(pid, magnitude, program = %program.display(), "worker spawned");
    Ok(WorkerHandle {
        child,
        pid,
        magnitude,
        started_at: Utc::now(),
    })
}

fn signal_group(handle: &mut WorkerHandle, signal: Signal) {
    let Some(group) = handle.group() else {
        warn!(pid = handle.pid, "pid does not fit a process group id, signalling leader only");
        let _ = handle.child.start_kill();
        return;
    };
    match killpg(group, signal) {
        // group already gone, the wait below reaps the leader
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(
            pid = handle.pid,
            signal = signal.as_str(),
            error = %e,
            "signal process group failed"
        ),
    }
}

/// SIGTERM the worker's group, wait up to `grace`, then SIGKILL and wait up to [`KILL_WAIT`].
pub async fn terminate(
    mut handle: WorkerHandle,
    grace: Duration,
) -> Result<ExitStatus, TerminateFailure> {
    if let Ok(Some(status)) = handle.child.try_wait() {
        debug!(pid = handle.pid, ?status, "worker had already exited");
        return Ok(status);
    }

    signal_group(&mut handle, Signal::SIGTERM);
    match timeout(grace, handle.child.wait()).await {
        Ok(Ok(status)) => {
            debug!(pid = handle.pid, ?status, "worker terminated");
            return Ok(status);
        }
        Ok(Err(e)) => warn!(pid = handle.pid, error = %e, "wait for worker failed"),
        Err(_) => warn!(pid = handle.pid, ?grace, "worker ignored SIGTERM, escalating"),
    }

    signal_group(&mut handle, Signal::SIGKILL);
    match timeout(KILL_WAIT, handle.child.wait()).await {
        Ok(Ok(status)) => {
            info!(pid = handle.pid, ?status, "worker killed");
            Ok(status)
        }
        Ok(Err(e)) => Err(TerminateFailure {
            reason: format!("wait after SIGKILL: {e}"),
            handle,
        }),
        Err(_) => Err(TerminateFailure {
            reason: "process unresponsive to SIGKILL".to_string(),
            handle,
        }),
    }
}
