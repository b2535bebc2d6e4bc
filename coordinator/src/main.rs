//! Campaign Coordinator binary.
//!
//! Resolves the configuration pipeline, run directory, validation, and
//! executable staging for one model, submits its parameter-sweep (or
//! single-point) tasks, and drives the worker manager's poll loop to
//! completion.

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod backup;
mod config;
mod coordinator;
mod error;
mod executable;
mod rundir;
mod validation;


use coordinator::{Coordinator, CoordinatorOptions};
use shared::cluster::resolve_cluster_params;
use worker::manager::NumWorkers;
use worker::reporter::TracingReporter;

/// Command-line arguments for the coordinator.
#[derive(Parser, Debug)]
#[command(name = "coordinator")]
#[command(about = "Runs a parameter-sweep simulation campaign for one model", long_about = None)]
struct CliArgs {
    /// Name of the model to run, as registered in the model registry.
    #[arg(value_name = "MODEL")]
    model_name: String,

    /// Path to the model registry TOML file.
    #[arg(long = "registry", value_name = "PATH")]
    registry_path: PathBuf,

    /// Directory under which `<model_name>/<run>` is created.
    #[arg(long = "out-dir", value_name = "DIR")]
    out_dir: PathBuf,

    /// Optional user config layer (YAML).
    #[arg(long = "user-cfg", value_name = "PATH")]
    user_cfg: Option<PathBuf>,

    /// Optional run config layer (YAML).
    #[arg(long = "run-cfg", value_name = "PATH")]
    run_cfg: Option<PathBuf>,

    /// A note appended to the run directory name, to disambiguate runs
    /// sharing the same timestamp second.
    #[arg(long = "note", value_name = "NOTE")]
    note: Option<String>,

    /// Expand and run the full parameter sweep instead of the single
    /// default point.
    #[arg(long = "sweep")]
    sweep: bool,

    /// Number of concurrent workers. Omit for `auto` (CPU count).
    #[arg(long = "num-workers", value_name = "N", allow_hyphen_values = true)]
    num_workers: Option<i64>,

    /// Total wall-clock timeout in seconds.
    #[arg(long = "timeout", value_name = "SECONDS")]
    timeout_secs: Option<u64>,

    /// Abort on the first non-zero task exit instead of logging and
    /// continuing.
    #[arg(long = "debug")]
    debug_mode: bool,

    /// Copy the model executable to a temporary directory before running.
    #[arg(long = "run-from-tmpdir")]
    run_from_tmpdir: bool,

    /// Skip backing up the individual config layer files (the merged meta
    /// config and parameter space are always backed up).
    #[arg(long = "no-backup-cfg-files")]
    no_backup_cfg_files: bool,

    /// Also back up the model executable into the run directory.
    #[arg(long = "backup-executable")]
    backup_executable: bool,

    /// Echo each task's captured stdout/stderr lines to this process'
    /// own output, in addition to capturing them.
    #[arg(long = "forward-streams")]
    forward_streams: bool,
}

/// Reads the `CAMPAIGN_CLUSTER_*` environment variables this coordinator
/// expects when run as part of a cluster job, returning `None` if none of
/// them are set (the common, non-cluster case).
fn resolve_cluster_env() -> Result<Option<shared::cluster::ClusterParams>> {
    const KEYS: &[(&str, &str)] = &[
        ("CAMPAIGN_CLUSTER_JOB_ID", "job_id"),
        ("CAMPAIGN_CLUSTER_NUM_NODES", "num_nodes"),
        ("CAMPAIGN_CLUSTER_NODE_LIST", "node_list"),
        ("CAMPAIGN_CLUSTER_NODE_NAME", "node_name"),
        ("CAMPAIGN_CLUSTER_TIMESTAMP", "timestamp"),
        ("CAMPAIGN_CLUSTER_OUT_DIR", "custom_out_dir"),
        (
            "CAMPAIGN_CLUSTER_RUN_DIR_FSTRS",
            "additional_run_dir_fstrs",
        ),
    ];

    let mut env = HashMap::new();
    for (var, key) in KEYS {
        if let Ok(value) = std::env::var(var) {
            env.insert(key.to_string(), value);
        }
    }
    if env.is_empty() {
        return Ok(None);
    }

    let params = resolve_cluster_params(&env).context("failed to resolve cluster environment")?;
    Ok(Some(params))
}

#[tokio::main]
async fn main() -> Result<()> {
    let file_appender = tracing_appender::rolling::daily("./logs", "coordinator.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("coordinator=info,worker=info,shared=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(non_blocking)
        .init();

    let cli_args = CliArgs::parse();

    info!(model = %cli_args.model_name, "campaign coordinator starting up");

    let cluster = resolve_cluster_env()?;
    if let Some(params) = &cluster {
        info!(
            node = %params.node_name,
            node_index = params.node_index,
            num_nodes = params.num_nodes,
            "running in cluster mode"
        );
    }

    let out_dir = cluster
        .as_ref()
        .and_then(|c| c.custom_out_dir.as_ref())
        .map(PathBuf::from)
        .unwrap_or_else(|| cli_args.out_dir.clone());

    let options = CoordinatorOptions {
        registry_path: cli_args.registry_path,
        model_name: cli_args.model_name,
        out_dir,
        model_note: cli_args.note,
        user_cfg_path: cli_args.user_cfg,
        run_cfg_path: cli_args.run_cfg,
        programmatic_overrides: None,
        perform_sweep: cli_args.sweep,
        num_workers: cli_args
            .num_workers
            .map(NumWorkers::Fixed)
            .unwrap_or(NumWorkers::Auto),
        poll_delay: Duration::from_millis(50),
        total_timeout: cli_args.timeout_secs.map(Duration::from_secs),
        debug_mode: cli_args.debug_mode,
        capture_stdout: true,
        capture_stderr: true,
        structured_stdout: true,
        run_from_tmpdir: cli_args.run_from_tmpdir,
        backup_cfg_files: !cli_args.no_backup_cfg_files,
        backup_executable: cli_args.backup_executable,
        cluster,
        forward_streams: cli_args.forward_streams,
    };

    let mut coordinator = match Coordinator::new(options, Box::new(TracingReporter), Vec::new()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to initialize campaign coordinator");
            std::process::exit(1);
        }
    };

    info!(run_dir = %coordinator.run_dir().root.display(), "run directory ready, starting campaign");

    if let Err(e) = coordinator.run().await {
        error!(error = %e, "campaign aborted");
        std::process::exit(1);
    }

    info!("campaign finished");
    Ok(())
}
