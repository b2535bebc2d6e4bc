//! Run directory creation and layout: `<out_dir>/<model_name>/
//! <timestamp>[_job<id>][_<note>]`, with standard `config/`, `data/`, and
//! `eval/` subdirectories created up front.

use std::path::{Path, PathBuf};

use crate::error::CoordinatorError;

/// The standard subdirectories of a run directory.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub eval_dir: PathBuf,
}

/// Information about the cluster node creating the run directory, used to
/// disambiguate concurrent runs of the same model sharing one `out_dir`.
#[derive(Debug, Clone, Copy)]
pub struct ClusterJobId(pub u32);

/// Builds the run directory's name: a `%y%m%d-%H%M%S` timestamp, optionally
/// suffixed with `_job<id>` (cluster mode) and `_<note>` (a user-supplied
/// disambiguator).
pub fn run_dir_name(model_note: Option<&str>, cluster_job: Option<ClusterJobId>) -> String {
    let timestamp = chrono::Local::now().format("%y%m%d-%H%M%S");
    let mut name = timestamp.to_string();
    if let Some(ClusterJobId(id)) = cluster_job {
        name.push_str(&format!("_job{id}"));
    }
    if let Some(note) = model_note {
        name.push('_');
        name.push_str(note);
    }
    name
}

/// Creates `<out_dir>/<model_name>/<run_dir_name>` and its standard
/// subdirectories. Fails if the run directory already exists rather than
/// silently reusing it, since a stale run directory from a previous attempt
/// could otherwise mix outputs from two different runs.
pub fn create_run_dir(
    out_dir: &Path,
    model_name: &str,
    model_note: Option<&str>,
    cluster_job: Option<ClusterJobId>,
) -> Result<RunDirectory, CoordinatorError> {
    let root = out_dir
        .join(model_name)
        .join(run_dir_name(model_note, cluster_job));

    if root.exists() {
        return Err(CoordinatorError::RunDirExists(root));
    }

    let config_dir = root.join("config");
    let data_dir = root.join("data");
    let eval_dir = root.join("eval");

    for dir in [&root, &config_dir, &data_dir, &eval_dir] {
        std::fs::create_dir_all(dir).map_err(|source| CoordinatorError::RunDirIo {
            path: dir.clone(),
            source,
        })?;
    }

    Ok(RunDirectory {
        root,
        config_dir,
        data_dir,
        eval_dir,
    })
}
