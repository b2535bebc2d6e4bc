//! Stop-Condition Evaluator: a named, pure predicate over a task's
//! telemetry. No side effects, re-evaluated every poll, idempotent firing
//! (the manager is free to ask again after a condition already fired).

use std::time::Duration;

use serde_json::Value;

use crate::stream::Telemetry;

/// A read-only view of a running task, handed to every stop condition on
/// every poll.
pub struct TaskView<'a> {
    pub name: &'a str,
    pub elapsed: Duration,
    pub telemetry: &'a Telemetry,
}

pub trait StopCondition: Send + Sync {
    fn name(&self) -> &str;
    fn fulfilled(&self, view: &TaskView<'_>) -> bool;
}

/// Fires once a task has run longer than `limit`.
pub struct WallTimeLimit {
    pub name: String,
    pub limit: Duration,
}

impl StopCondition for WallTimeLimit {
    fn name(&self) -> &str {
        &self.name
    }

    fn fulfilled(&self, view: &TaskView<'_>) -> bool {
        view.elapsed >= self.limit
    }
}

/// Fires once a named field in the task's progress telemetry matches an
/// expected value exactly. Typical use: a model reports `{"status":
/// "diverged"}` and the campaign should stop that universe early.
pub struct ProgressFieldEquals {
    pub name: String,
    pub field: String,
    pub expected: Value,
}

impl StopCondition for ProgressFieldEquals {
    fn name(&self) -> &str {
        &self.name
    }

    fn fulfilled(&self, view: &TaskView<'_>) -> bool {
        view.telemetry.progress.get(&self.field) == Some(&self.expected)
    }
}

/// Wraps an arbitrary closure as a stop condition, for one-off predicates
/// that don't warrant their own named type.
pub struct FnStopCondition<F> {
    pub name: String,
    pub predicate: F,
}

impl<F> StopCondition for FnStopCondition<F>
where
    F: Fn(&TaskView<'_>) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fulfilled(&self, view: &TaskView<'_>) -> bool {
        (self.predicate)(view)
    }
}
