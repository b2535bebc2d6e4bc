//! Typed error enums for the configuration/validation/submission surface.
//!
//! Each enum corresponds to one of the failure categories a campaign run can
//! hit before any worker is ever spawned. `worker::error` picks up from here
//! with the scheduler-side errors.

use std::path::PathBuf;

/// Errors from the config pipeline: reading, parsing, or merging the five
/// layers into the final meta-config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("the user config layer may not set `parameter_space` directly (found in {path})")]
    UserLayerSetsParameterSpace { path: PathBuf },
}

/// Errors surfaced while validating the merged parameter space against a
/// model's declared `parameters_to_validate`. The message is pre-formatted
/// (one aligned line per invalid key path) since the caller already knows
/// the full set of offending paths before raising.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

/// Errors from staging or verifying the model executable.
#[derive(Debug, thiserror::Error)]
pub enum ExecutableError {
    #[error("executable not found: {0}")]
    NotFound(PathBuf),

    #[error("path is not executable: {0}")]
    NotExecutable(PathBuf),

    #[error("failed to stage executable into temp dir: {0}")]
    Stage(#[source] std::io::Error),
}

/// Errors from the model registry lookup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("model '{0}' is not registered")]
    NotFound(String),
}

/// Errors from decoding the cluster-environment mapping.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("missing required cluster environment variable(s): {0:?}")]
    MissingVars(Vec<String>),

    #[error("`node_list` ({len}) has a different length than `num_nodes` ({num_nodes})")]
    NodeListLengthMismatch { len: usize, num_nodes: usize },

    #[error("`node_name` '{0}' is not part of `node_list`")]
    NodeNameNotInList(String),

    #[error("`num_nodes` is not a valid integer: {0}")]
    InvalidNumNodes(String),
}

/// Errors raised while submitting tasks (single-point or sweep) to the
/// worker manager, before any worker has started.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("parameter space has no points to sweep (volume is 0)")]
    EmptyParameterSpace,

    #[error("a run has already been submitted on this coordinator")]
    AlreadySubmitted,
}
