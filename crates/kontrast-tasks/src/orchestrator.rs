// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Task orchestrator: runs image jobs on the blocking pool and tracks their
// state for pollers.
//
// Each task owns a `watch` channel. The sending half lives in a `TaskWriter`
// that is moved into the worker, so exactly one writer exists per task; the
// table only ever holds receivers, and `status` reads a consistent snapshot.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kontrast_core::error::{KontrastError, Result};
use kontrast_core::{ParameterBag, TaskId, TaskStatus};
use kontrast_imaging::{EnhancementSettings, PixelBuffer, ProgressSink};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::estimate::estimate_duration;
use crate::history::{CompletedRun, HistorySink};
use crate::jobs::JobKind;
use crate::policy::{Adjustment, OptimizationPolicy};

// Task progress milestones, in percent.
const INPUT_READY: u8 = 20;
const PIPELINE_SPAN: f32 = 60.0;
const PIPELINE_DONE: u8 = 80;
const RESULT_NAMED: u8 = 90;
const HISTORY_WRITTEN: u8 = 95;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Everything needed to start a task.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Name of the image the task starts from; used for result naming.
    pub source_name: String,
    pub kind: JobKind,
    pub input: PixelBuffer,
    pub params: ParameterBag,
}

/// Output of a completed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    #[serde(skip)]
    pub image: Arc<PixelBuffer>,
    pub result_name: String,
    /// Set when the history log accepted the run.
    pub history_id: Option<String>,
}

/// Snapshot of a task, as seen by a poller.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub kind: JobKind,
    pub status: TaskStatus,
    /// Percent complete, never decreasing while processing.
    pub progress: u8,
    pub result: Option<TaskOutput>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub estimated: Duration,
    pub elapsed: Duration,
    /// Only present while processing.
    pub estimated_remaining: Option<Duration>,
    /// Parameters the optimisation policy changed before the run.
    pub adjustments: Vec<Adjustment>,
}

// ---------------------------------------------------------------------------
// Task record and its single writer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TaskRecord {
    status: TaskStatus,
    progress: u8,
    result: Option<TaskOutput>,
    error: Option<String>,
}

impl TaskRecord {
    fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            progress: 0,
            result: None,
            error: None,
        }
    }
}

struct TaskSlot {
    kind: JobKind,
    created_at: DateTime<Utc>,
    started: Instant,
    estimated: Duration,
    adjustments: Vec<Adjustment>,
    state: watch::Receiver<TaskRecord>,
}

/// The only handle able to change a task. Not `Clone`; finishing consumes it.
struct TaskWriter {
    id: TaskId,
    tx: watch::Sender<TaskRecord>,
}

impl TaskWriter {
    fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.tx.send_if_modified(|record| {
            if record.status == TaskStatus::Processing && percent > record.progress {
                record.progress = percent;
                true
            } else {
                false
            }
        });
    }

    fn complete(self, output: TaskOutput) {
        self.tx.send_modify(|record| {
            if record.status == TaskStatus::Processing {
                record.status = TaskStatus::Completed;
                record.progress = 100;
                record.result = Some(output);
            }
        });
    }

    fn fail(self, message: String) {
        self.finish_failed(message);
    }

    fn finish_failed(&self, message: String) {
        self.tx.send_modify(|record| {
            if record.status == TaskStatus::Processing {
                record.status = TaskStatus::Failed;
                record.error = Some(message);
            }
        });
    }
}

impl Drop for TaskWriter {
    fn drop(&mut self) {
        if self.tx.borrow().status == TaskStatus::Processing {
            warn!(task_id = %self.id, "worker exited without a result");
            self.finish_failed("worker exited without reporting a result".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Schedules tasks and answers status queries. Cheap to clone; clones share
/// the same task table.
#[derive(Clone)]
pub struct TaskOrchestrator {
    tasks: Arc<RwLock<HashMap<TaskId, TaskSlot>>>,
    runtime: Handle,
    history: Arc<dyn HistorySink>,
    policy: OptimizationPolicy,
}

impl TaskOrchestrator {
    pub fn new(runtime: Handle, history: Arc<dyn HistorySink>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            runtime,
            history,
            policy: OptimizationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: OptimizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start a job, letting the optimisation policy adjust its parameters
    /// for large inputs first.
    pub fn submit_job(&self, mut request: TaskRequest) -> TaskId {
        let (width, height) = request.input.dimensions();
        let plan = self
            .policy
            .plan(request.kind, &request.params, width, height);
        request.params = plan.params;
        let adjustments = plan.adjustments;
        let estimated = estimate_for(&request);
        let kind = request.kind;
        self.spawn(request, estimated, adjustments, move |input, params, sink| {
            kind.run(input, params, sink)
        })
    }

    /// Start `work` on its own worker and return immediately. The parameters
    /// are passed through unchanged.
    pub fn submit<F>(&self, request: TaskRequest, work: F) -> TaskId
    where
        F: FnOnce(PixelBuffer, &ParameterBag, &dyn ProgressSink) -> Result<PixelBuffer>
            + Send
            + 'static,
    {
        let estimated = estimate_for(&request);
        self.spawn(request, estimated, Vec::new(), work)
    }

    #[instrument(skip_all, fields(kind = %request.kind, source = %request.source_name))]
    fn spawn<F>(
        &self,
        request: TaskRequest,
        estimated: Duration,
        adjustments: Vec<Adjustment>,
        work: F,
    ) -> TaskId
    where
        F: FnOnce(PixelBuffer, &ParameterBag, &dyn ProgressSink) -> Result<PixelBuffer>
            + Send
            + 'static,
    {
        let id = TaskId::new();
        let (tx, rx) = watch::channel(TaskRecord::processing());
        let slot = TaskSlot {
            kind: request.kind,
            created_at: Utc::now(),
            started: Instant::now(),
            estimated,
            adjustments,
            state: rx,
        };
        self.write_table().insert(id, slot);
        info!(task_id = %id, estimated_secs = estimated.as_secs_f32(), "task submitted");

        let writer = TaskWriter { id, tx };
        let history = Arc::clone(&self.history);
        // The worker runs to completion whether or not anyone still polls it.
        drop(
            self.runtime
                .spawn_blocking(move || execute(writer, request, work, history.as_ref())),
        );
        id
    }

    /// Latest snapshot of `id`.
    pub fn status(&self, id: TaskId) -> Result<TaskView> {
        let tasks = self.read_table();
        let slot = tasks.get(&id).ok_or(KontrastError::NotFound(id))?;
        Ok(view(id, slot))
    }

    /// Wait until `id` reaches a terminal state.
    ///
    /// The task is looked up when this is called, not when the future is
    /// first polled. Fails with `Timeout` if `timeout` elapses first and with
    /// `Stale` if the task was evicted before its outcome could be read.
    pub fn wait(
        &self,
        id: TaskId,
        timeout: Duration,
    ) -> impl Future<Output = Result<TaskView>> + Send + 'static {
        let this = self.clone();
        let state = self.read_table().get(&id).map(|slot| slot.state.clone());
        async move {
            let mut state = state.ok_or(KontrastError::NotFound(id))?;
            let finished = tokio::time::timeout(timeout, state.wait_for(|r| r.status.is_terminal()))
                .await
                .map(|changed| changed.is_ok());
            match finished {
                Err(_) => return Err(KontrastError::Timeout(id)),
                Ok(false) => return Err(KontrastError::Stale(id)),
                Ok(true) => {}
            }
            this.status(id).map_err(|e| match e {
                KontrastError::NotFound(id) => KontrastError::Stale(id),
                other => other,
            })
        }
    }

    /// Drop every task at least `max_age` old, finished or not. Returns how
    /// many were removed.
    #[instrument(skip(self))]
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let mut tasks = self.write_table();
        let before = tasks.len();
        tasks.retain(|_, slot| slot.started.elapsed() < max_age);
        let removed = before - tasks.len();
        if removed > 0 {
            info!(removed, remaining = tasks.len(), "evicted stale tasks");
        }
        removed
    }

    /// Run `evict_stale(max_age)` every `interval` until the runtime shuts
    /// down or the handle is aborted.
    pub fn spawn_reaper(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let this = self.clone();
        let interval = interval.max(Duration::from_millis(1));
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = this.evict_stale(max_age);
                debug!(removed, "reaper pass");
            }
        })
    }

    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    // A panic never happens while the table lock is held, but recover the
    // guard rather than propagate poison if one ever does.
    fn read_table(&self) -> RwLockReadGuard<'_, HashMap<TaskId, TaskSlot>> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, TaskSlot>> {
        self.tasks.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn view(id: TaskId, slot: &TaskSlot) -> TaskView {
    let record = slot.state.borrow().clone();
    let elapsed = slot.started.elapsed();
    let estimated_remaining = (record.status == TaskStatus::Processing)
        .then(|| slot.estimated.saturating_sub(elapsed));
    TaskView {
        id,
        kind: slot.kind,
        status: record.status,
        progress: record.progress,
        result: record.result,
        error: record.error,
        created_at: slot.created_at,
        estimated: slot.estimated,
        elapsed,
        estimated_remaining,
        adjustments: slot.adjustments.clone(),
    }
}

fn estimate_for(request: &TaskRequest) -> Duration {
    let (width, height) = request.input.dimensions();
    if request.kind.is_enhancement() {
        let settings = EnhancementSettings::from_bag(&request.params);
        estimate_duration(width, height, settings.window_size, settings.use_entropy)
    } else {
        estimate_duration(width, height, 15, false)
    }
}

/// Worker body. Every outcome, including a panic in `work` or in the history
/// sink, ends in a terminal state.
fn execute<F>(writer: TaskWriter, request: TaskRequest, work: F, history: &dyn HistorySink)
where
    F: FnOnce(PixelBuffer, &ParameterBag, &dyn ProgressSink) -> Result<PixelBuffer>,
{
    let id = writer.id;
    let outcome = catch_unwind(AssertUnwindSafe(|| produce(&writer, request, work, history)));
    match outcome {
        Ok(Ok(output)) => {
            info!(task_id = %id, result = %output.result_name, "task completed");
            writer.complete(output);
        }
        Ok(Err(e)) => {
            error!(task_id = %id, error = %e, "task failed");
            writer.fail(e.to_string());
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(task_id = %id, panic = %message, "task worker panicked");
            writer.fail(format!("worker panicked: {message}"));
        }
    }
}

fn produce<F>(
    writer: &TaskWriter,
    request: TaskRequest,
    work: F,
    history: &dyn HistorySink,
) -> Result<TaskOutput>
where
    F: FnOnce(PixelBuffer, &ParameterBag, &dyn ProgressSink) -> Result<PixelBuffer>,
{
    let TaskRequest {
        source_name,
        kind,
        input,
        params,
    } = request;
    writer.progress(INPUT_READY);

    let sink = |fraction: f32| {
        let scaled = INPUT_READY as f32 + fraction.clamp(0.0, 1.0) * PIPELINE_SPAN;
        writer.progress(scaled.round() as u8);
    };
    let image = work(input, &params, &sink)?;
    writer.progress(PIPELINE_DONE);

    let mut result_name = kind.result_name(Utc::now(), writer.id, &source_name);
    writer.progress(RESULT_NAMED);

    let run = CompletedRun {
        kind,
        source_name: &source_name,
        result_name: &result_name,
        params: &params,
        result: &image,
    };
    // A panicking sink costs the history entry, never the result.
    let recorded = catch_unwind(AssertUnwindSafe(|| history.record(&run)));
    let history_id = match recorded {
        Ok(Ok(entry)) if entry.id.is_empty() => None,
        Ok(Ok(entry)) => {
            result_name = entry.result_name;
            Some(entry.id)
        }
        Ok(Err(e)) => {
            warn!(task_id = %writer.id, error = %e, "history write failed, keeping result");
            None
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(task_id = %writer.id, panic = %message, "history sink panicked, keeping result");
            None
        }
    };
    writer.progress(HISTORY_WRITTEN);

    Ok(TaskOutput {
        image: Arc::new(image),
        result_name,
        history_id,
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
