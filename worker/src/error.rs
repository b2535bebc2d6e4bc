//! Scheduler-side error types: everything that can go wrong once tasks
//! start being spawned and supervised.

use thiserror::Error;

/// Raised when a task-level input can't be trusted as valid: an
/// undecodable stream byte reaching the line parser (spec.md §4.3/§4.4).
/// Spec.md also names invalid (non-sequence) spawn `args` as a source of
/// this error, but this workspace's `TaskSpec::args` is already a typed
/// `Vec<OsString>` by construction, so that case can't occur here; only the
/// stream-decode path ever constructs this error.
#[derive(Debug, Error)]
#[error("task '{name}' stream decode error: {reason}")]
pub struct TaskTypeError {
    pub name: String,
    pub reason: String,
}

/// Raised when a task exits with a non-zero code or is killed by a signal.
#[derive(Debug, Error)]
#[error("task '{name}' finished with non-ok status: {code}")]
pub struct NonZeroExit {
    pub name: String,
    /// Positive for a plain exit code, negative for "killed by signal N"
    /// (mirrors the POSIX convention of a negative process return code).
    pub code: i32,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("total timeout of {0:?} exceeded; all active tasks were sent SIGTERM")]
    TotalTimeout(std::time::Duration),

    #[error(transparent)]
    TaskType(#[from] TaskTypeError),

    #[error(transparent)]
    NonZeroExit(#[from] NonZeroExit),

    #[error("failed to spawn task '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot add task '{0}': task list is already locked")]
    AlreadyLocked(String),

    #[error("task '{0}' was already added under that name")]
    DuplicateTask(String),
}
