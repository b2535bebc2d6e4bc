//! Reporter interface: a pluggable observer of the worker manager's poll
//! loop, named after the callback keys the manager invokes it with.

use shared::TerminalStatus;

pub trait Reporter: Send + Sync {
    fn while_working(&self, _active: usize, _pending: usize, _finished: usize) {}
    fn task_spawned(&self, _name: &str) {}
    fn task_finished(&self, _name: &str, _status: TerminalStatus) {}
    fn after_work(&self, _finished: usize) {}
    fn after_abort(&self, _reason: &str) {}
}

/// Logs one structured `tracing` event per callback.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn while_working(&self, active: usize, pending: usize, finished: usize) {
        tracing::debug!(active, pending, finished, "while_working");
    }

    fn task_spawned(&self, name: &str) {
        tracing::info!(task = name, "task_spawned");
    }

    fn task_finished(&self, name: &str, status: TerminalStatus) {
        match status {
            TerminalStatus::Ok => tracing::info!(task = name, "task_finished ok"),
            TerminalStatus::NonZero(code) => {
                tracing::warn!(task = name, exit_code = code, "task_finished non-zero")
            }
            TerminalStatus::Signalled(sig) => {
                tracing::warn!(task = name, signal = sig, "task_finished signalled")
            }
        }
    }

    fn after_work(&self, finished: usize) {
        tracing::info!(finished, "after_work");
    }

    fn after_abort(&self, reason: &str) {
        tracing::error!(reason, "after_abort");
    }
}

/// A reporter that does nothing, for tests that don't care about
/// observability output.
pub struct NullReporter;

impl Reporter for NullReporter {}
