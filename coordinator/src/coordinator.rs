//! The Campaign Coordinator: ties the configuration pipeline, run directory,
//! validation, executable staging, and task submission together, then hands
//! the locked task list to a `WorkerManager`.
//!
//! Construction runs the full pipeline in order: config merge -> run
//! directory -> validation -> backup -> executable staging -> one task per
//! parameter-space point -> lock. `run` then drives the manager's poll loop
//! exactly once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use shared::cluster::{node_is_responsible_for, ClusterParams};
use shared::error::SubmissionError;
use shared::registry::ModelRegistry;
use shared::{TaskSpec, UniversePoint};

use worker::manager::{NumWorkers, WorkerManager};
use worker::reporter::Reporter;
use worker::stopcond::StopCondition;

use crate::backup::perform_backup;
use crate::config::build_meta_cfg;
use crate::error::CoordinatorError;
use crate::executable::{stage_executable, StagedExecutable};
use crate::rundir::{create_run_dir, ClusterJobId, RunDirectory};
use crate::validation::validate_param_space;

/// Everything needed to stand up one coordinator instance.
pub struct CoordinatorOptions {
    pub registry_path: PathBuf,
    pub model_name: String,
    pub out_dir: PathBuf,
    pub model_note: Option<String>,
    pub user_cfg_path: Option<PathBuf>,
    pub run_cfg_path: Option<PathBuf>,
    pub programmatic_overrides: Option<Value>,
    pub perform_sweep: bool,
    pub num_workers: NumWorkers,
    pub poll_delay: Duration,
    pub total_timeout: Option<Duration>,
    pub debug_mode: bool,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    pub structured_stdout: bool,
    pub run_from_tmpdir: bool,
    pub backup_cfg_files: bool,
    pub backup_executable: bool,
    pub cluster: Option<ClusterParams>,
    pub forward_streams: bool,
}

/// A fully prepared campaign, ready to be `run()`.
pub struct Coordinator {
    run_dir: RunDirectory,
    manager: WorkerManager,
    total_timeout: Option<Duration>,
    forward_streams: bool,
    ran: bool,
    // Keeps the staged executable's temp directory (if any) alive for as
    // long as this coordinator is; tasks only reference its path, spawned
    // later during `run()`, so the directory must outlive `new()`.
    _staged: StagedExecutable,
}

impl Coordinator {
    /// Runs the entire pre-execution pipeline: registry lookup, run
    /// directory creation, config merge, validation, backup, executable
    /// staging, and task submission. Any failure here is fatal and pre-run,
    /// per the propagation policy.
    pub fn new(
        options: CoordinatorOptions,
        reporter: Box<dyn Reporter>,
        stop_conditions: Vec<Box<dyn StopCondition>>,
    ) -> Result<Self, CoordinatorError> {
        let registry = ModelRegistry::load(&options.registry_path)?;
        let model_info = registry.lookup(&options.model_name)?;

        let is_first_node = options
            .cluster
            .as_ref()
            .map(|c| c.node_index == 0)
            .unwrap_or(true);

        let cluster_job = options
            .cluster
            .as_ref()
            .map(|c| ClusterJobId(c.job_id.parse().unwrap_or(0)));

        let run_dir = match create_run_dir(
            &options.out_dir,
            &options.model_name,
            options.model_note.as_deref(),
            cluster_job,
        ) {
            Ok(dir) => dir,
            Err(CoordinatorError::RunDirExists(path)) if options.cluster.is_some() => {
                // A shared run directory across cluster nodes is expected;
                // only the non-first node sees it already created.
                RunDirectory {
                    config_dir: path.join("config"),
                    data_dir: path.join("data"),
                    eval_dir: path.join("eval"),
                    root: path,
                }
            }
            Err(e) => return Err(e),
        };

        let meta = build_meta_cfg(
            &options.model_name,
            model_info,
            options.user_cfg_path.as_deref(),
            options.run_cfg_path.as_deref(),
            options.programmatic_overrides.as_ref(),
        )?;

        validate_param_space(&meta.param_space, &meta.parameters_to_validate)?;

        if is_first_node {
            perform_backup(
                &run_dir.config_dir,
                &run_dir.root,
                &meta.merged,
                &meta.param_space,
                &meta.cfg_parts,
                options.backup_cfg_files,
                options
                    .backup_executable
                    .then_some(model_info.executable.as_path()),
                &options.model_name,
            )?;
        }

        let staged = stage_executable(
            &model_info.executable,
            &options.model_name,
            options.run_from_tmpdir,
        )?;

        let mut manager = WorkerManager::new(
            options.num_workers,
            options.poll_delay,
            reporter,
            stop_conditions,
            options.debug_mode,
        );

        submit_tasks(
            &mut manager,
            &meta.param_space,
            &options.model_name,
            &run_dir,
            &staged.path,
            options.perform_sweep,
            options.cluster.as_ref(),
            options.capture_stdout,
            options.capture_stderr,
            options.structured_stdout,
        )?;

        manager.lock_tasks();

        Ok(Self {
            run_dir,
            manager,
            total_timeout: options.total_timeout,
            forward_streams: options.forward_streams,
            ran: false,
            _staged: staged,
        })
    }

    pub fn run_dir(&self) -> &RunDirectory {
        &self.run_dir
    }

    /// Hands the locked task list to the manager's poll loop. Exactly-once
    /// per coordinator instance, mirroring the Worker Manager's own
    /// exactly-once `start_working` contract.
    pub async fn run(&mut self) -> Result<(), CoordinatorError> {
        if self.ran {
            return Err(SubmissionError::AlreadySubmitted.into());
        }
        self.ran = true;
        self.manager
            .start_working(self.total_timeout, self.forward_streams, None, None)
            .await
            .map_err(CoordinatorError::from)
    }
}

/// Submits one task per `(point, id_string)`, in single-point mode when
/// `perform_sweep` is false regardless of how many dimensions the space
/// declares, and skipping points this node isn't responsible for in
/// cluster mode.
#[allow(clippy::too_many_arguments)]
fn submit_tasks(
    manager: &mut WorkerManager,
    param_space: &shared::paramspace::ParamSpace,
    model_name: &str,
    run_dir: &RunDirectory,
    executable: &Path,
    perform_sweep: bool,
    cluster: Option<&ClusterParams>,
    capture_stdout: bool,
    capture_stderr: bool,
    structured_stdout: bool,
) -> Result<(), CoordinatorError> {
    if !perform_sweep {
        let spec = build_task_spec(
            &param_space.default,
            model_name,
            "0",
            run_dir,
            executable,
            capture_stdout,
            capture_stderr,
            structured_stdout,
        )?;
        manager.add_task(spec).map_err(CoordinatorError::from)?;
        return Ok(());
    }

    if param_space.volume() == 0 {
        return Err(SubmissionError::EmptyParameterSpace.into());
    }

    for (i, (point, id)) in param_space.iterator().enumerate() {
        if let Some(params) = cluster {
            if !node_is_responsible_for(i, params) {
                continue;
            }
        }
        let spec = build_task_spec(
            &point,
            model_name,
            &id,
            run_dir,
            executable,
            capture_stdout,
            capture_stderr,
            structured_stdout,
        )?;
        manager.add_task(spec).map_err(CoordinatorError::from)?;
    }

    Ok(())
}

/// Picks out the per-model universe config from a raw parameter-space
/// point. The model's own default config is merged in at
/// `parameter_space.<model_name>` (`config::build_meta_cfg`), so a point
/// produced by iterating the *whole* parameter space still carries that
/// nesting; this unwraps it into the flat config the child process expects.
/// A point with no such nesting (e.g. one built directly, bypassing the
/// config pipeline) is used as-is.
fn model_universe_cfg(point: &Value, model_name: &str) -> Value {
    point
        .as_object()
        .and_then(|obj| obj.get(model_name))
        .cloned()
        .unwrap_or_else(|| point.clone())
}

#[allow(clippy::too_many_arguments)]
fn build_task_spec(
    point: &Value,
    model_name: &str,
    id: &str,
    run_dir: &RunDirectory,
    executable: &Path,
    capture_stdout: bool,
    capture_stderr: bool,
    structured_stdout: bool,
) -> Result<TaskSpec, CoordinatorError> {
    let uni_dir = run_dir.data_dir.join(format!("uni{id}"));
    std::fs::create_dir_all(&uni_dir).map_err(|source| CoordinatorError::RunDirIo {
        path: uni_dir.clone(),
        source,
    })?;

    let data_path = uni_dir.join("data.h5");
    let config_path = uni_dir.join("config.yml");
    let uni_cfg = model_universe_cfg(point, model_name);
    let num_steps = get_u64(&uni_cfg, "num_steps");
    let write_every = get_u64(&uni_cfg, "write_every");
    let write_start = get_u64(&uni_cfg, "write_start");

    let mut resolved = uni_cfg.clone();
    if let Some(obj) = resolved.as_object_mut() {
        obj.insert(
            "output_path".to_string(),
            Value::String(data_path.display().to_string()),
        );
        obj.insert("num_steps".to_string(), Value::from(num_steps));
        obj.insert("write_every".to_string(), Value::from(write_every));
        obj.insert("write_start".to_string(), Value::from(write_start));
    }
    let content = serde_yaml::to_string(&resolved).expect("resolved point always serializes");
    std::fs::write(&config_path, content).map_err(|source| CoordinatorError::RunDirIo {
        path: config_path.clone(),
        source,
    })?;

    let universe = UniversePoint {
        id: id.to_string(),
        dir: uni_dir.clone(),
        config_path: config_path.clone(),
        data_path,
        num_steps,
        write_every,
        write_start,
        params: resolved.clone(),
    };

    Ok(TaskSpec {
        name: format!("uni{id}"),
        priority: None,
        executable: executable.to_path_buf(),
        args: vec![config_path.clone().into_os_string()],
        universe,
        capture_stdout,
        capture_stderr,
        stdout_log: capture_stdout.then(|| uni_dir.join("out.log")),
        stderr_log: capture_stderr.then(|| uni_dir.join("err.log")),
        structured_stdout,
    })
}

fn get_u64(point: &Value, key: &str) -> u64 {
    point
        .as_object()
        .and_then(|m| m.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}
