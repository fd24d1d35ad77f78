//! Resource monitor: polls a running child process for memory usage and wall
//! time, terminating it if either cap configured in a `SecurityPolicy` is breached.
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tokio::process::Child;
use tokio::time;

use crate::kernel::constants::MEMORY_POLL_INTERVAL_MS;
use crate::security::error::{Result, SecuritySystemError};
use crate::security::policy::SecurityPolicy;

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorOutcome {
    pub peak_memory_bytes: u64,
    pub duration: Duration,
}

/// Supervises `child` against `policy`'s wall-time and memory caps. Returns the
/// observed peak memory and duration if the process exits within both caps;
/// otherwise kills the process tree and returns the breached-cap error.
pub async fn supervise(child: &mut Child, policy: &SecurityPolicy) -> Result<MonitorOutcome> {
    let pid = child
        .id()
        .ok_or_else(|| SecuritySystemError::ProcessSupervisionFailed {
            message: "child process has no pid (already exited)".to_string(),
        })?;

    let mut system = System::new_with_specifics(RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()));
    let started_at = Instant::now();
    let mut peak_memory_bytes: u64 = 0;
    let poll_interval = Duration::from_millis(MEMORY_POLL_INTERVAL_MS);

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| SecuritySystemError::ProcessSupervisionFailed {
                    message: e.to_string(),
                })?;
                let _ = status;
                return Ok(MonitorOutcome {
                    peak_memory_bytes,
                    duration: started_at.elapsed(),
                });
            }
            _ = time::sleep(poll_interval) => {
                system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
                if let Some(process) = system.process(Pid::from_u32(pid)) {
                    peak_memory_bytes = peak_memory_bytes.max(process.memory());
                }

                if peak_memory_bytes > policy.memory_cap_bytes {
                    kill_tree(child, pid).await;
                    return Err(SecuritySystemError::MemoryExceeded {
                        peak_bytes: peak_memory_bytes,
                        cap_bytes: policy.memory_cap_bytes,
                    });
                }

                if started_at.elapsed() > policy.wall_time_cap {
                    kill_tree(child, pid).await;
                    return Err(SecuritySystemError::Timeout {
                        cap_secs: policy.wall_time_cap.as_secs(),
                    });
                }
            }
        }
    }
}

async fn kill_tree(child: &mut Child, pid: u32) {
    let mut system = System::new_with_specifics(RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()));
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    for process in system.processes().values() {
        if process.parent() == Some(Pid::from_u32(pid)) {
            process.kill();
        }
    }
    let _ = child.kill().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;

    fn fast_policy() -> SecurityPolicy {
        SecurityPolicy::for_execution(
            Path::new("/tmp"),
            Path::new("/tmp"),
            HashSet::new(),
            Duration::from_millis(50),
            1024 * 1024 * 1024,
        )
    }

    #[tokio::test]
    async fn normal_exit_reports_duration() {
        let mut child = tokio::process::Command::new("true")
            .spawn()
            .expect("spawn 'true'");
        let policy = SecurityPolicy::for_execution(
            Path::new("/tmp"),
            Path::new("/tmp"),
            HashSet::new(),
            Duration::from_secs(5),
            1024 * 1024 * 1024,
        );
        let outcome = supervise(&mut child, &policy).await.expect("should exit cleanly");
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn wall_time_breach_is_reported() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("5")
            .spawn()
            .expect("spawn 'sleep'");
        let policy = fast_policy();
        let result = supervise(&mut child, &policy).await;
        assert!(matches!(result, Err(SecuritySystemError::Timeout { .. })));
    }
}
