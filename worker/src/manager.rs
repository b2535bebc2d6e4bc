//! Worker Manager: a bounded-parallel scheduler driving a fixed poll loop
//! over a set of child processes. Staggered spawn and mpsc-based
//! non-blocking result collection, generalized from polling timer ticks to
//! polling OS child processes directly.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use shared::TaskSpec;

use crate::error::SchedulerError;
use crate::reporter::Reporter;
use crate::stopcond::{StopCondition, TaskView};
use crate::task::WorkerTask;

/// How many workers may run at once. `auto` resolves to the CPU count; a
/// negative count means "leave that many cores free".
#[derive(Debug, Clone, Copy)]
pub enum NumWorkers {
    Auto,
    Fixed(i64),
}

pub fn resolve_num_workers(requested: NumWorkers) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match requested {
        NumWorkers::Auto => available,
        NumWorkers::Fixed(n) if n > 0 => n as usize,
        NumWorkers::Fixed(n) => available.saturating_sub(n.unsigned_abs() as usize).max(1),
    }
}

pub struct WorkerManager {
    tasks: Vec<WorkerTask>,
    queue: VecDeque<usize>,
    active: Vec<usize>,
    locked: bool,
    num_workers: usize,
    poll_delay: Duration,
    reporter: Box<dyn Reporter>,
    stop_conditions: Vec<Box<dyn StopCondition>>,
    debug_mode: bool,
    pending_exceptions: Vec<SchedulerError>,
    num_finished: usize,
}

impl WorkerManager {
    pub fn new(
        num_workers: NumWorkers,
        poll_delay: Duration,
        reporter: Box<dyn Reporter>,
        stop_conditions: Vec<Box<dyn StopCondition>>,
        debug_mode: bool,
    ) -> Self {
        if poll_delay < Duration::from_millis(10) {
            tracing::warn!(
                ?poll_delay,
                "poll_delay below 10ms; the manager will busy-poll and waste CPU"
            );
        }
        Self {
            tasks: Vec::new(),
            queue: VecDeque::new(),
            active: Vec::new(),
            locked: false,
            num_workers: resolve_num_workers(num_workers),
            poll_delay,
            reporter,
            stop_conditions,
            debug_mode,
            pending_exceptions: Vec::new(),
            num_finished: 0,
        }
    }

    /// Registers a new task. Fails once the task list has been locked by
    /// `start_working`, or if a task with the same name was already added.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<(), SchedulerError> {
        if self.locked {
            return Err(SchedulerError::AlreadyLocked(spec.name));
        }
        if self.tasks.iter().any(|t| t.spec.name == spec.name) {
            return Err(SchedulerError::DuplicateTask(spec.name));
        }
        self.tasks.push(WorkerTask::pending(spec));
        Ok(())
    }

    /// Freezes the task list and orders the pending queue by priority
    /// (unset priority sorts last, as if it were `+inf`). Idempotent:
    /// calling twice is a no-op the second time.
    pub fn lock_tasks(&mut self) {
        if self.locked {
            return;
        }
        let mut indices: Vec<usize> = (0..self.tasks.len()).collect();
        indices.sort_by_key(|&i| self.tasks[i].spec.priority.unwrap_or(i64::MAX));
        self.queue = indices.into();
        self.locked = true;
    }

    pub fn num_finished(&self) -> usize {
        self.num_finished
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    pub fn num_queued(&self) -> usize {
        self.queue.len()
    }

    pub fn tasks(&self) -> &[WorkerTask] {
        &self.tasks
    }

    /// Runs the fixed poll loop until the queue and active set are both
    /// empty, a total timeout elapses, or (in debug mode) a task fails.
    /// Only `SchedulerError::TotalTimeout` and, in debug mode,
    /// `SchedulerError::NonZeroExit`/`TaskType` escape this call —
    /// everything else is recorded on the task and logged.
    ///
    /// `stop_conditions`, given here, replaces whatever was passed to
    /// `new` for the duration of this run; `None` keeps the constructor's
    /// set. `forward_streams` additionally echoes every drained line to
    /// this process' own stdout/stderr. `post_poll_hook` runs once per
    /// iteration after exit polling, before the poll-delay sleep — the
    /// escape hatch for callers who need a hard `SIGKILL` past the
    /// manager's own `SIGTERM`-only abort path.
    pub async fn start_working(
        &mut self,
        total_timeout: Option<Duration>,
        forward_streams: bool,
        stop_conditions: Option<Vec<Box<dyn StopCondition>>>,
        mut post_poll_hook: Option<Box<dyn FnMut() + Send>>,
    ) -> Result<(), SchedulerError> {
        if let Some(conds) = stop_conditions {
            self.stop_conditions = conds;
        }
        self.lock_tasks();
        let start = Instant::now();

        loop {
            if let Some(total) = total_timeout {
                if start.elapsed() >= total {
                    self.signal_active(Signal::SIGTERM);
                    self.reporter.after_abort("total timeout exceeded");
                    return Err(SchedulerError::TotalTimeout(total));
                }
            }

            if let Some(err) = self.take_debug_failure() {
                self.signal_active(Signal::SIGTERM);
                self.reporter.after_abort("task failed in debug mode");
                return Err(err);
            }

            if self.active.len() < self.num_workers {
                self.try_grab()?;
            }

            self.reporter
                .while_working(self.active.len(), self.queue.len(), self.num_finished);

            for &idx in &self.active {
                self.tasks[idx].drain(forward_streams);
            }

            self.signal_fulfilled_stop_conditions();
            self.poll_finished();

            if let Some(hook) = post_poll_hook.as_mut() {
                hook();
            }

            // A task may have just failed in this same iteration; check again
            // before declaring the run done so a debug-mode failure on the
            // very last task still aborts rather than silently succeeding.
            if let Some(err) = self.take_debug_failure() {
                self.signal_active(Signal::SIGTERM);
                self.reporter.after_abort("task failed in debug mode");
                return Err(err);
            }

            if self.queue.is_empty() && self.active.is_empty() {
                self.log_pending_exceptions();
                self.reporter.after_work(self.num_finished);
                return Ok(());
            }

            tokio::time::sleep(self.poll_delay).await;
        }
    }

    /// In debug mode, pops the latest pending exception so the caller can
    /// abort on it. A no-op (returns `None`) outside debug mode, where
    /// failures are left queued for `log_pending_exceptions` instead.
    fn take_debug_failure(&mut self) -> Option<SchedulerError> {
        if !self.debug_mode {
            return None;
        }
        self.pending_exceptions.pop()
    }

    fn try_grab(&mut self) -> Result<(), SchedulerError> {
        let Some(idx) = self.queue.pop_front() else {
            return Ok(());
        };
        self.tasks[idx].spawn()?;
        self.active.push(idx);
        self.reporter.task_spawned(&self.tasks[idx].spec.name);
        Ok(())
    }

    fn signal_fulfilled_stop_conditions(&mut self) {
        let mut to_signal = Vec::new();
        for &idx in &self.active {
            let task = &self.tasks[idx];
            let view = TaskView {
                name: &task.spec.name,
                elapsed: task.elapsed(),
                telemetry: &task.telemetry,
            };
            if self.stop_conditions.iter().any(|sc| sc.fulfilled(&view)) {
                to_signal.push(idx);
            }
        }
        for idx in to_signal {
            if let Err(e) = self.tasks[idx].signal(Signal::SIGTERM) {
                tracing::warn!(task = %self.tasks[idx].spec.name, error = %e, "failed to signal task for stop condition");
            }
        }
    }

    fn signal_active(&self, sig: Signal) {
        for &idx in &self.active {
            if let Err(e) = self.tasks[idx].signal(sig) {
                tracing::warn!(task = %self.tasks[idx].spec.name, error = %e, "failed to deliver signal");
            }
        }
    }

    fn poll_finished(&mut self) {
        let mut still_active = Vec::with_capacity(self.active.len());
        for idx in std::mem::take(&mut self.active) {
            // An undecodable stream line is a task-level type error
            // regardless of whether the task has exited yet; surface it to
            // the scheduler the same way a non-zero exit is surfaced.
            if let Some(err) = self.tasks[idx].take_decode_error() {
                self.pending_exceptions.push(SchedulerError::from(err));
            }
            match self.tasks[idx].poll_exit() {
                Ok(Some(terminal)) => {
                    self.num_finished += 1;
                    self.reporter
                        .task_finished(&self.tasks[idx].spec.name, terminal);
                    // Only a non-zero exit is a failure. A signalled exit is
                    // expected fallout of a stop condition or an abort and is
                    // never pushed onto the pending-exceptions queue.
                    if let shared::TerminalStatus::NonZero(code) = terminal {
                        let err = SchedulerError::from(crate::error::NonZeroExit {
                            name: self.tasks[idx].spec.name.clone(),
                            code,
                        });
                        self.pending_exceptions.push(err);
                    }
                }
                Ok(None) => still_active.push(idx),
                Err(e) => {
                    tracing::error!(task = %self.tasks[idx].spec.name, error = %e, "failed to poll task exit status");
                    still_active.push(idx);
                }
            }
        }
        self.active = still_active;
    }

    /// Logs every pending exception accumulated over a non-debug run. In
    /// debug mode the queue is always drained (and the run aborted) by the
    /// next loop iteration, so this only ever has something to say for a
    /// normal-mode run that finished with one or more non-zero exits.
    fn log_pending_exceptions(&mut self) {
        if self.pending_exceptions.is_empty() {
            return;
        }
        tracing::warn!(
            count = self.pending_exceptions.len(),
            "run finished with non-zero-exit tasks"
        );
        for err in self.pending_exceptions.drain(..) {
            tracing::warn!(error = %err, "pending task failure");
        }
    }
}
