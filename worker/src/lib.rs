//! Worker Manager, Worker Task, Stream Line Parser, Stop-Condition
//! Evaluator, and Reporter trait: the scheduler/task lifecycle core that
//! spawns and supervises simulation child processes.

pub mod error;
pub mod manager;
pub mod reporter;
pub mod stopcond;
pub mod stream;
pub mod task;

pub use error::{NonZeroExit, SchedulerError, TaskTypeError};
pub use manager::{NumWorkers, WorkerManager};
pub use reporter::{NullReporter, Reporter, TracingReporter};
pub use stopcond::{FnStopCondition, ProgressFieldEquals, StopCondition, TaskView, WallTimeLimit};
pub use stream::{JsonRecordParser, LineParser, ParsedLine, RawLineParser, Telemetry};
pub use task::WorkerTask;

#[cfg(test)]
mod tests;
