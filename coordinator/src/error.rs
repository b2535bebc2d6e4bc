//! Coordinator-level error type: wraps every pre-run failure category named
//! in the shared error enums, plus the two run-directory failures that are
//! specific to this crate (no counterpart in `shared` since `worker` has no
//! notion of a run directory).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Config(#[from] shared::error::ConfigError),

    #[error(transparent)]
    Validation(#[from] shared::error::ValidationError),

    #[error(transparent)]
    Executable(#[from] shared::error::ExecutableError),

    #[error(transparent)]
    Registry(#[from] shared::error::RegistryError),

    #[error(transparent)]
    Cluster(#[from] shared::error::ClusterError),

    #[error(transparent)]
    Submission(#[from] shared::error::SubmissionError),

    #[error(transparent)]
    Scheduler(#[from] worker::error::SchedulerError),

    #[error("run directory already exists: {0} (hint: add a model_note to disambiguate)")]
    RunDirExists(PathBuf),

    #[error("failed to set up run directory at {path}: {source}")]
    RunDirIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
