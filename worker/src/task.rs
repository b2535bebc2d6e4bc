//! Worker Task: the lifecycle of one spawned child process — spawn with a
//! typed argument vector, non-blocking stream drain, telemetry, exit
//! recording, and signal delivery to the whole process group.

use std::fs::File;
use std::io::Write as _;
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;

use shared::{TaskSpec, TaskState, TerminalStatus};

use crate::error::{SchedulerError, TaskTypeError};
use crate::stream::{JsonRecordParser, LineParser, RawLineParser, Telemetry};

enum StreamSource {
    Stdout,
    Stderr,
}

struct StreamEvent {
    source: StreamSource,
    line: std::io::Result<String>,
}

/// One task's full lifecycle: `Pending -> Spawned -> Running ->
/// Terminal(_)`. Transitions only move forward.
pub struct WorkerTask {
    pub spec: TaskSpec,
    pub state: TaskState,
    child: Option<Child>,
    stream_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    stdout_log: Option<File>,
    stderr_log: Option<File>,
    pub telemetry: Telemetry,
    spawned_at: Option<Instant>,
    stdout_parser: Box<dyn LineParser>,
    /// Set when a stream line fails to decode as UTF-8; taken (and cleared)
    /// by the manager each poll so it is reported exactly once.
    decode_error: Option<TaskTypeError>,
}

impl WorkerTask {
    pub fn pending(spec: TaskSpec) -> Self {
        // Each task picks its own stdout parser from its `structured_stdout`
        // flag; stderr is always treated as raw log output (spec.md §4.3).
        let stdout_parser: Box<dyn LineParser> = if spec.structured_stdout {
            Box::new(JsonRecordParser)
        } else {
            Box::new(RawLineParser)
        };
        Self {
            spec,
            state: TaskState::Pending,
            child: None,
            stream_rx: None,
            stdout_log: None,
            stderr_log: None,
            telemetry: Telemetry::default(),
            spawned_at: None,
            stdout_parser,
            decode_error: None,
        }
    }

    /// Spawns the child process with a typed argument vector (never a
    /// shell), wires its stdout/stderr to background line-pumping tasks,
    /// and opens the per-stream log files if configured.
    pub fn spawn(&mut self) -> Result<(), SchedulerError> {
        let mut cmd = Command::new(&self.spec.executable);
        cmd.args(&self.spec.args);
        cmd.current_dir(&self.spec.universe.dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(if self.spec.capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stderr(if self.spec.capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        // Put the child in its own process group so a later SIGTERM can be
        // delivered to it and any children it spawns in one shot.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SchedulerError::Spawn {
            name: self.spec.name.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(stdout) = child.stdout.take() {
            spawn_stdout_pump(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_pump(stderr, tx.clone());
        }
        drop(tx);

        if let Some(path) = &self.spec.stdout_log {
            self.stdout_log = File::create(path).ok();
        }
        if let Some(path) = &self.spec.stderr_log {
            self.stderr_log = File::create(path).ok();
        }

        self.child = Some(child);
        self.stream_rx = Some(rx);
        self.spawned_at = Some(Instant::now());
        self.state = TaskState::Spawned;
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.spawned_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Drains every line currently buffered on either stream without
    /// blocking. Safe to call every poll tick regardless of whether any
    /// data is actually available. When `forward_streams` is set, each
    /// line is additionally echoed to this process' own stdout/stderr,
    /// prefixed with the task name.
    pub fn drain(&mut self, forward_streams: bool) {
        let Some(rx) = self.stream_rx.as_mut() else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            match event.line {
                Ok(line) => match event.source {
                    StreamSource::Stdout => {
                        self.telemetry.bytes_read_stdout += line.len() as u64 + 1;
                        if let Some(f) = self.stdout_log.as_mut() {
                            let _ = writeln!(f, "{line}");
                        }
                        if forward_streams {
                            println!("[{}] {line}", self.spec.name);
                        }
                        self.telemetry.ingest_stdout(self.stdout_parser.parse(&line));
                    }
                    StreamSource::Stderr => {
                        self.telemetry.bytes_read_stderr += line.len() as u64 + 1;
                        if let Some(f) = self.stderr_log.as_mut() {
                            let _ = writeln!(f, "{line}");
                        }
                        if forward_streams {
                            eprintln!("[{}] {line}", self.spec.name);
                        }
                        self.telemetry.ingest_stderr(line);
                    }
                },
                Err(err) => {
                    // A UTF-8 decode failure is fatal at the line level: this
                    // stream stops draining, the task and its other stream
                    // are unaffected, but the failure itself is surfaced to
                    // the scheduler as a pending `TaskTypeError` rather than
                    // just logged, per spec.md §4.4/§7.
                    tracing::warn!(
                        task = %self.spec.name,
                        error = %err,
                        "stream decode error, stopping drain for this stream"
                    );
                    self.decode_error.get_or_insert(TaskTypeError {
                        name: self.spec.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// Takes the pending stream-decode error, if any, clearing it so it is
    /// reported to the scheduler exactly once.
    pub fn take_decode_error(&mut self) -> Option<TaskTypeError> {
        self.decode_error.take()
    }

    /// Non-blocking check for child exit. Returns the terminal status once
    /// the child has actually exited.
    pub fn poll_exit(&mut self) -> std::io::Result<Option<TerminalStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        match child.try_wait()? {
            Some(status) => {
                let terminal = terminal_status_from(status);
                self.state = TaskState::Terminal(terminal);
                Ok(Some(terminal))
            }
            None => {
                self.state = TaskState::Running;
                Ok(None)
            }
        }
    }

    /// Delivers a POSIX signal to the task's whole process group. A no-op
    /// once the child has already been reaped.
    pub fn signal(&self, sig: Signal) -> nix::Result<()> {
        let Some(child) = self.child.as_ref() else {
            return Ok(());
        };
        let Some(pid) = child.id() else {
            return Ok(());
        };
        kill(Pid::from_raw(-(pid as i32)), sig)
    }
}

fn spawn_stdout_pump(stdout: ChildStdout, tx: mpsc::UnboundedSender<StreamEvent>) {
    let mut lines = BufReader::new(stdout).lines();
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx
                        .send(StreamEvent {
                            source: StreamSource::Stdout,
                            line: Ok(line),
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(StreamEvent {
                        source: StreamSource::Stdout,
                        line: Err(e),
                    });
                    break;
                }
            }
        }
    });
}

fn spawn_stderr_pump(stderr: ChildStderr, tx: mpsc::UnboundedSender<StreamEvent>) {
    let mut lines = BufReader::new(stderr).lines();
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx
                        .send(StreamEvent {
                            source: StreamSource::Stderr,
                            line: Ok(line),
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(StreamEvent {
                        source: StreamSource::Stderr,
                        line: Err(e),
                    });
                    break;
                }
            }
        }
    });
}

fn terminal_status_from(status: std::process::ExitStatus) -> TerminalStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return TerminalStatus::Signalled(sig);
        }
    }
    match status.code() {
        Some(0) => TerminalStatus::Ok,
        Some(code) => TerminalStatus::NonZero(code),
        None => TerminalStatus::NonZero(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn pending_task() -> WorkerTask {
        let universe = shared::UniversePoint {
            id: "0".to_string(),
            dir: PathBuf::from("."),
            config_path: PathBuf::from("config.yml"),
            data_path: PathBuf::from("data.h5"),
            num_steps: 0,
            write_every: 0,
            write_start: 0,
            params: serde_json::json!({}),
        };
        WorkerTask::pending(TaskSpec {
            name: "uni0".to_string(),
            priority: None,
            executable: PathBuf::from("/bin/true"),
            args: vec![OsString::from("config.yml")],
            universe,
            capture_stdout: true,
            capture_stderr: true,
            stdout_log: None,
            stderr_log: None,
            structured_stdout: true,
        })
    }

    #[test]
    fn decode_error_is_reported_once_then_cleared() {
        let mut task = pending_task();
        assert!(task.take_decode_error().is_none());

        task.decode_error = Some(TaskTypeError {
            name: task.spec.name.clone(),
            reason: "stream did not contain valid UTF-8".to_string(),
        });

        let err = task.take_decode_error().expect("decode error should be recorded");
        assert_eq!(err.name, "uni0");
        assert!(task.take_decode_error().is_none(), "must be cleared after taking");
    }
}
