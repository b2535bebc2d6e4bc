//! Stand-in "model" binary: reads one config file argument, writes a
//! placeholder data file, emits structured progress lines on stdout, and
//! exits with a configurable code. Exists only so the worker/coordinator
//! test suites have something to spawn without a real simulation model.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FixtureConfig {
    output_path: PathBuf,
    #[serde(default = "default_num_steps")]
    num_steps: u64,
    #[serde(default)]
    step_sleep_ms: u64,
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    emit_stderr_lines: Vec<String>,
    #[serde(default = "default_true")]
    structured_stdout: bool,
    /// Writes a line of invalid UTF-8 bytes to stdout before exiting, to
    /// exercise the stream decode-error path in worker-level tests.
    #[serde(default)]
    emit_invalid_utf8_stdout: bool,
}

fn default_num_steps() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .expect("universe-sim requires exactly one positional argument: the config file path");

    let raw = std::fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("failed to read config {config_path}: {e}"));
    // Accepts both YAML (the real per-universe `config.yml`) and bare JSON
    // (as written by worker-level tests), since JSON parses as YAML too.
    let config: FixtureConfig =
        serde_yaml::from_str(&raw).unwrap_or_else(|e| panic!("failed to parse config {config_path}: {e}"));

    for line in &config.emit_stderr_lines {
        eprintln!("{line}");
    }

    if config.emit_invalid_utf8_stdout {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(&[0xff, 0xfe, b'\n']).ok();
        handle.flush().ok();
    }

    for step in 0..config.num_steps {
        if config.step_sleep_ms > 0 {
            std::thread::sleep(Duration::from_millis(config.step_sleep_ms));
        }
        if config.structured_stdout {
            println!(
                r#"{{"step": {step}, "progress": {:.4}}}"#,
                (step + 1) as f64 / config.num_steps as f64
            );
        } else {
            println!("step {step} of {}", config.num_steps);
        }
        std::io::stdout().flush().ok();
    }

    if let Some(parent) = config.output_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(&config.output_path, b"placeholder").expect("failed to write output data file");

    std::process::exit(config.exit_code);
}
