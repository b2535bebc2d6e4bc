//! Data-model types shared between the worker and coordinator crates.

use std::ffi::OsString;
use std::path::PathBuf;

/// One point in the expanded parameter space, with its on-disk layout
/// already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct UniversePoint {
    /// Zero-padded id string, e.g. `"003"`.
    pub id: String,
    pub dir: PathBuf,
    pub config_path: PathBuf,
    pub data_path: PathBuf,
    pub num_steps: u64,
    pub write_every: u64,
    pub write_start: u64,
    pub params: serde_json::Value,
}

/// Everything the worker manager needs to spawn and supervise one child
/// process. `priority` sorts ascending with unset treated as lowest
/// priority: `None` sorts after every `Some(_)`, equivalent to `+inf`.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub priority: Option<i64>,
    pub executable: PathBuf,
    pub args: Vec<OsString>,
    pub universe: UniversePoint,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    pub stdout_log: Option<PathBuf>,
    pub stderr_log: Option<PathBuf>,
    pub structured_stdout: bool,
}

/// One-way task lifecycle: `Pending -> Spawned -> Running -> Terminal(_)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Spawned,
    Running,
    Terminal(TerminalStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Ok,
    NonZero(i32),
    Signalled(i32),
}

impl TerminalStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, TerminalStatus::Ok)
    }
}
