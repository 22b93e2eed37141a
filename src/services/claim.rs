//! Execution claim layer.
//!
//! Exactly-one-executor semantics: a claim pins a task to one process.
//! The store's compare-and-swap write is the serialisation point; this
//! service computes the liveness decision that feeds it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::errors::{OrcError, OrcResult};
use crate::domain::models::Task;
use crate::domain::ports::TaskStore;

/// Whether a pid is alive on this host. `kill(pid, 0)` probes without
/// signalling; EPERM still means the process exists.
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Local hostname, used to scope liveness decisions.
pub fn local_hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Outcome of the liveness decision for an existing claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimDecision {
    /// No claim on the row
    Empty,
    /// We already hold it
    Reentrant,
    /// Previous executor is demonstrably dead; take over its claim
    Orphan,
    /// A live (or presumed-live) executor holds it
    Held,
}

pub struct ClaimService<S> {
    store: Arc<S>,
    pid: u32,
    host: String,
}

impl<S: TaskStore> ClaimService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            pid: std::process::id(),
            host: local_hostname(),
        }
    }

    /// Override the claimed identity. Test seam.
    pub fn with_identity(store: Arc<S>, pid: u32, host: impl Into<String>) -> Self {
        Self {
            store,
            pid,
            host: host.into(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn decide(&self, task: &Task) -> ClaimDecision {
        if task.executor_pid == 0 {
            return ClaimDecision::Empty;
        }
        if task.executor_pid == self.pid && task.executor_host == self.host {
            return ClaimDecision::Reentrant;
        }
        if task.executor_host != self.host {
            // Cannot probe a foreign host; treat as live
            return ClaimDecision::Held;
        }
        if pid_alive(task.executor_pid) {
            ClaimDecision::Held
        } else {
            ClaimDecision::Orphan
        }
    }

    /// Claim a task for this process. At most one of two racing callers
    /// succeeds; the loser gets `AlreadyClaimed`. With `force`, the
    /// existing claim is overwritten unconditionally.
    pub async fn try_claim(&self, task_id: &str, force: bool) -> OrcResult<Task> {
        let task = self
            .store
            .load_task(task_id)
            .await?
            .ok_or_else(|| OrcError::TaskNotFound(task_id.to_string()))?;

        if task.status.is_terminal() {
            return Err(OrcError::InvalidStateTransition {
                from: task.status.as_str().to_string(),
                to: "running".to_string(),
            });
        }

        if force {
            warn!(task_id, pid = self.pid, "Forcing claim takeover");
            self.store
                .claim_execution_force(task_id, self.pid, &self.host)
                .await?;
            return self.reload(task_id).await;
        }

        let (expected_pid, expected_host) = match self.decide(&task) {
            ClaimDecision::Empty => (0, String::new()),
            ClaimDecision::Reentrant => {
                return Ok(task);
            }
            ClaimDecision::Orphan => {
                info!(
                    task_id,
                    orphan_pid = task.executor_pid,
                    "Previous executor is dead; taking over orphaned claim"
                );
                (task.executor_pid, task.executor_host.clone())
            }
            ClaimDecision::Held => {
                return Err(OrcError::AlreadyClaimed {
                    task_id: task_id.to_string(),
                    pid: task.executor_pid,
                    host: task.executor_host,
                });
            }
        };

        let won = self
            .store
            .claim_execution_cas(task_id, expected_pid, &expected_host, self.pid, &self.host)
            .await?;
        if !won {
            // Someone claimed (or finished) between our read and the CAS
            let task = self.reload(task_id).await?;
            if task.status.is_terminal() {
                return Err(OrcError::InvalidStateTransition {
                    from: task.status.as_str().to_string(),
                    to: "running".to_string(),
                });
            }
            return Err(OrcError::AlreadyClaimed {
                task_id: task_id.to_string(),
                pid: task.executor_pid,
                host: task.executor_host,
            });
        }

        info!(task_id, pid = self.pid, host = %self.host, "Claimed task execution");
        self.reload(task_id).await
    }

    /// Clear the claim if this process holds it. Safe to call on every
    /// shutdown path; a mismatch is reported, not acted on.
    pub async fn release(&self, task_id: &str) -> OrcResult<bool> {
        let released = self
            .store
            .release_execution(task_id, self.pid, &self.host)
            .await?;
        if released {
            info!(task_id, pid = self.pid, "Released task execution");
        } else {
            warn!(
                task_id,
                pid = self.pid,
                "Release skipped: claim is not held by this process"
            );
        }
        Ok(released)
    }

    async fn reload(&self, task_id: &str) -> OrcResult<Task> {
        self.store
            .load_task(task_id)
            .await?
            .ok_or_else(|| OrcError::TaskNotFound(task_id.to_string()))
    }
}
