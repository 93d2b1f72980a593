//! Sequential pipeline runner.
//!
//! [`PipelineMachine`] is the pure state machine: Idle → Running(step i of N)
//! → Succeeded | Failed, strictly forward, no retries. [`PipelineRun`] feeds it
//! events from a channel; a [`StepExecutor`] spawns each step off-thread and
//! reports its output lines followed by exactly one exit event.
//!
//! ```text
//!   caller ──poll()/wait()──▶ PipelineRun ──launch(step, tx)──▶ StepExecutor
//!                                 ▲                                   │
//!                                 └──── Line(..)* then Exited(..) ────┘
//! ```

use crate::pipeline::{ConversionPlan, PipelineStep, TempWorkspace};
use crossbeam_channel::{never, unbounded, Receiver, Sender, TryRecvError};
use shared_utils::logging::log_external_tool;
use shared_utils::{format_ffmpeg_error, stream_lines, AppError};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info};

// ═══════════════════════════════════════════════════════════════
// State machine
// ═══════════════════════════════════════════════════════════════

/// How a step's process ended. `code` is `None` when it was killed by a signal
/// or never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepExit {
    pub code: Option<i32>,
}

impl StepExit {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn abnormal() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running { step: usize, total: usize },
    Succeeded,
    Failed { step: usize, exit_code: Option<i32> },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed { .. })
    }
}

/// What the driver must do after feeding the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Launch(usize),
    Finished,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct PipelineMachine {
    total: usize,
    state: PipelineState,
}

impl PipelineMachine {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn start(&mut self) -> Transition {
        if self.state != PipelineState::Idle {
            return Transition::Ignored;
        }
        if self.total == 0 {
            self.state = PipelineState::Succeeded;
            return Transition::Finished;
        }
        self.state = PipelineState::Running {
            step: 0,
            total: self.total,
        };
        Transition::Launch(0)
    }

    pub fn on_step_exit(&mut self, exit: StepExit) -> Transition {
        let PipelineState::Running { step, total } = self.state else {
            return Transition::Ignored;
        };
        if !exit.success() {
            self.state = PipelineState::Failed {
                step,
                exit_code: exit.code,
            };
            Transition::Finished
        } else if step + 1 < total {
            self.state = PipelineState::Running {
                step: step + 1,
                total,
            };
            Transition::Launch(step + 1)
        } else {
            self.state = PipelineState::Succeeded;
            Transition::Finished
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Events and executors
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// One line of the step's merged stdout/stderr.
    Line(String),
    /// Always the last event of a step.
    Exited(StepExit),
}

/// Starts pipeline steps without blocking the caller.
pub trait StepExecutor: Send + Sync {
    /// Spawn `step` and report through `events`: any number of lines, then one
    /// `Exited`. Dropping `events` without an exit counts as an abnormal exit.
    fn launch(&self, step: &PipelineStep, events: Sender<RunnerEvent>);
}

/// Runs steps as real processes, one worker thread per step.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl StepExecutor for SystemExecutor {
    fn launch(&self, step: &PipelineStep, events: Sender<RunnerEvent>) {
        let step = step.clone();
        thread::spawn(move || {
            let exit = run_step(&step, &events);
            let _ = events.send(RunnerEvent::Exited(exit));
        });
    }
}

fn forward_lines<R: Read + Send + 'static>(
    stream: R,
    events: &Sender<RunnerEvent>,
) -> JoinHandle<()> {
    let tx = events.clone();
    thread::spawn(move || {
        stream_lines(stream, |line| {
            let _ = tx.send(RunnerEvent::Line(line));
        })
    })
}

/// Spawn `step` with stdout and stderr sharing one pipe, so its lines reach
/// the channel in the order the process wrote them.
fn spawn_merged(
    step: &PipelineStep,
    events: &Sender<RunnerEvent>,
) -> io::Result<(Child, JoinHandle<()>)> {
    let (reader, writer) = io::pipe()?;
    let mut cmd = step.command();
    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let child = cmd.spawn()?;
    // the reader only sees EOF once every write end is closed
    drop(cmd);
    Ok((child, forward_lines(reader, events)))
}

fn run_step(step: &PipelineStep, events: &Sender<RunnerEvent>) -> StepExit {
    let command = step.display_command();
    let started = Instant::now();
    let (mut child, reader) = match spawn_merged(step, events) {
        Ok(spawned) => spawned,
        Err(e) => {
            error!(step = %step.label, error = %e, "Failed to start pipeline step");
            let _ = events.send(RunnerEvent::Line(format!(
                "Failed to start {}: {}",
                step.program.display(),
                e
            )));
            return StepExit::abnormal();
        }
    };

    let status = child.wait();
    // all output must be forwarded before the exit event
    let _ = reader.join();

    let exit = match status {
        Ok(status) => StepExit {
            code: status.code(),
        },
        Err(e) => {
            error!(step = %step.label, error = %e, "Failed to wait for pipeline step");
            StepExit::abnormal()
        }
    };
    log_external_tool(&command, "", exit.code, started.elapsed());
    exit
}

// ═══════════════════════════════════════════════════════════════
// Log sink and busy flag
// ═══════════════════════════════════════════════════════════════

/// Receives the human-readable conversion log.
pub trait LogSink: Send {
    fn line(&mut self, text: &str);
}

/// Sink that keeps every line; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl LogSink for MemoryLog {
    fn line(&mut self, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(text.to_string());
    }
}

/// Exclusive claim on a "one run at a time" flag, released on drop.
#[derive(Debug)]
pub struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    /// `None` when the flag is already held.
    pub fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════
// PipelineRun
// ═══════════════════════════════════════════════════════════════

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed {
        label: String,
        exit_code: Option<i32>,
        /// Most meaningful line of the failed step's output.
        detail: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            RunOutcome::Succeeded => Ok(()),
            RunOutcome::Failed {
                label,
                exit_code,
                detail,
            } => Err(AppError::SubprocessFailed {
                label,
                exit_code,
                detail,
            }),
        }
    }
}

/// One in-flight conversion. Nothing here blocks except [`wait`](Self::wait).
pub struct PipelineRun {
    machine: PipelineMachine,
    steps: Vec<PipelineStep>,
    workspace: Option<TempWorkspace>,
    executor: Arc<dyn StepExecutor>,
    sink: Box<dyn LogSink>,
    events: Receiver<RunnerEvent>,
    step_output: Vec<String>,
    outcome: Option<RunOutcome>,
    busy: Option<BusyGuard>,
}

impl std::fmt::Debug for PipelineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("state", &self.machine.state())
            .field("steps", &self.steps.len())
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl PipelineRun {
    /// Launch the first step of `plan` (or finish at once for an empty plan).
    pub fn start(
        plan: ConversionPlan,
        executor: Arc<dyn StepExecutor>,
        sink: Box<dyn LogSink>,
    ) -> Self {
        Self::start_holding(plan, executor, sink, None)
    }

    /// [`start`](Self::start), keeping `busy` claimed until the run is terminal.
    pub fn start_holding(
        plan: ConversionPlan,
        executor: Arc<dyn StepExecutor>,
        sink: Box<dyn LogSink>,
        busy: Option<BusyGuard>,
    ) -> Self {
        let mut machine = PipelineMachine::new(plan.steps.len());
        let transition = machine.start();
        let mut run = Self {
            machine,
            steps: plan.steps,
            workspace: plan.workspace,
            executor,
            sink,
            events: never(),
            step_output: Vec::new(),
            outcome: None,
            busy,
        };
        run.apply(transition);
        run
    }

    pub fn state(&self) -> PipelineState {
        self.machine.state()
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Palette directory while the run holds one.
    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace.as_ref().map(TempWorkspace::path)
    }

    /// Handle every event already queued. Returns the outcome once terminal.
    pub fn poll(&mut self) -> Option<&RunOutcome> {
        while self.outcome.is_none() {
            match self.events.try_recv() {
                Ok(event) => self.handle(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.handle(RunnerEvent::Exited(StepExit::abnormal()))
                }
            }
        }
        self.outcome.as_ref()
    }

    /// Block until the run is terminal.
    pub fn wait(mut self) -> RunOutcome {
        loop {
            if let Some(outcome) = self.outcome.take() {
                return outcome;
            }
            match self.events.recv() {
                Ok(event) => self.handle(event),
                Err(_) => self.handle(RunnerEvent::Exited(StepExit::abnormal())),
            }
        }
    }

    fn handle(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Line(line) => {
                self.sink.line(&line);
                self.step_output.push(line);
            }
            RunnerEvent::Exited(exit) => {
                debug!(exit_code = ?exit.code, state = ?self.machine.state(), "Step exited");
                let transition = self.machine.on_step_exit(exit);
                self.apply(transition);
            }
        }
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Launch(index) => self.launch(index),
            Transition::Finished => self.finish(),
            Transition::Ignored => {}
        }
    }

    fn launch(&mut self, index: usize) {
        let step = &self.steps[index];
        let command = step.display_command();
        if self.steps.len() > 1 {
            self.sink.line(&format!("Running ({}): {}", step.label, command));
        } else {
            self.sink.line(&format!("Running: {}", command));
        }
        info!(step = index + 1, total = self.steps.len(), label = %step.label, "Starting pipeline step");

        let (tx, rx) = unbounded();
        self.events = rx;
        self.step_output.clear();
        self.executor.launch(step, tx);
    }

    fn finish(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            workspace.close();
        }
        let outcome = match self.machine.state() {
            PipelineState::Succeeded => {
                self.sink.line("\nDone! ✅");
                info!("Conversion finished");
                RunOutcome::Succeeded
            }
            PipelineState::Failed { step, exit_code } => {
                self.sink.line("\nFailed. ❌");
                let label = self
                    .steps
                    .get(step)
                    .map(|s| s.label.clone())
                    .unwrap_or_default();
                let detail = format_ffmpeg_error(&self.step_output.join("\n"));
                error!(label = %label, exit_code = ?exit_code, detail = %detail, "Conversion failed");
                RunOutcome::Failed {
                    label,
                    exit_code,
                    detail,
                }
            }
            PipelineState::Idle | PipelineState::Running { .. } => return,
        };
        self.outcome = Some(outcome);
        self.busy = None;
    }
}
