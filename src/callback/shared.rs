//! Async adapter between an engine's callback hooks and the recorder.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::task;
use tracing::warn;

use super::events::{RunEvent, TaskInfo};
use crate::config::RecorderConfig;
use crate::recorder::{OutcomeKind, Recorder};

/// Callback for receiving run lifecycle events.
///
/// Every hook has a no-op default so implementors only override what they
/// care about. Engines that already produce [`RunEvent`] values can call
/// [`RunCallback::on_event`] instead of the individual hooks.
#[async_trait]
pub trait RunCallback: Send + Sync {
    /// Called once when the run starts.
    async fn on_run_start(&self) {}

    /// Called when a play (or a serial batch of it) starts.
    async fn on_play_start(&self, name: &str, key: &str, serial_batch: Option<u32>) {
        let _ = (name, key, serial_batch);
    }

    /// Called when a task starts.
    async fn on_task_start(&self, task: &TaskInfo, has_rescue: bool) {
        let _ = (task, has_rescue);
    }

    /// Called when a handler is notified.
    async fn on_handler_notify(&self, task: &TaskInfo) {
        let _ = task;
    }

    /// Called with the final result of a task on one host.
    async fn on_host_result(
        &self,
        task_key: &str,
        host: &str,
        outcome: OutcomeKind,
        ignore_errors: bool,
        payload: &JsonValue,
    ) {
        let _ = (task_key, host, outcome, ignore_errors, payload);
    }

    /// Called when a module reports a diff.
    async fn on_file_diff(&self, task_key: &str, host: &str, payload: &JsonValue) {
        let _ = (task_key, host, payload);
    }

    /// Called once when the run ends.
    async fn on_run_end(&self) {}

    /// Routes an event value to the matching hook.
    async fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStart => self.on_run_start().await,
            RunEvent::PlayStart {
                name,
                key,
                serial_batch,
            } => self.on_play_start(name, key, *serial_batch).await,
            RunEvent::TaskStart { task, has_rescue } => self.on_task_start(task, *has_rescue).await,
            RunEvent::HandlerNotify { task } => self.on_handler_notify(task).await,
            RunEvent::HostResult {
                task_key,
                host,
                outcome,
                ignore_errors,
                payload,
            } => {
                self.on_host_result(task_key, host, *outcome, *ignore_errors, payload)
                    .await
            }
            RunEvent::FileDiff {
                task_key,
                host,
                payload,
            } => self.on_file_diff(task_key, host, payload).await,
            RunEvent::RunEnd => self.on_run_end().await,
        }
    }
}

/// A [`Recorder`] that can be handed to async code.
///
/// Recorder steps render and write report files, so each hook runs its step
/// on tokio's blocking pool and awaits it. The lock is taken inside the
/// blocking task and never held across an await point.
#[derive(Debug, Clone)]
pub struct SharedRecorder {
    inner: Arc<Mutex<Recorder>>,
}

impl SharedRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self::from_recorder(Recorder::new(config))
    }

    pub fn from_recorder(recorder: Recorder) -> Self {
        Self {
            inner: Arc::new(Mutex::new(recorder)),
        }
    }

    /// Runs `f` with the recorder locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Recorder) -> R) -> R {
        f(&mut self.inner.lock())
    }

    async fn step(&self, f: impl FnOnce(&mut Recorder) + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        if let Err(e) = task::spawn_blocking(move || f(&mut inner.lock())).await {
            warn!(error = %e, "Recorder step did not complete");
        }
    }
}

#[async_trait]
impl RunCallback for SharedRecorder {
    async fn on_run_start(&self) {
        self.step(|r| r.on_run_start()).await;
    }

    async fn on_play_start(&self, name: &str, key: &str, serial_batch: Option<u32>) {
        let (name, key) = (name.to_string(), key.to_string());
        self.step(move |r| r.on_play_start(&name, &key, serial_batch))
            .await;
    }

    async fn on_task_start(&self, task: &TaskInfo, has_rescue: bool) {
        let task = task.clone();
        self.step(move |r| r.on_task_start(&task, has_rescue)).await;
    }

    async fn on_handler_notify(&self, task: &TaskInfo) {
        let task = task.clone();
        self.step(move |r| r.on_handler_notify(&task)).await;
    }

    async fn on_host_result(
        &self,
        task_key: &str,
        host: &str,
        outcome: OutcomeKind,
        ignore_errors: bool,
        payload: &JsonValue,
    ) {
        let (task_key, host, payload) = (task_key.to_string(), host.to_string(), payload.clone());
        self.step(move |r| r.on_host_result(&task_key, &host, outcome, ignore_errors, payload))
            .await;
    }

    async fn on_file_diff(&self, task_key: &str, host: &str, payload: &JsonValue) {
        let (task_key, host, payload) = (task_key.to_string(), host.to_string(), payload.clone());
        self.step(move |r| r.on_file_diff(&task_key, &host, &payload))
            .await;
    }

    async fn on_run_end(&self) {
        self.step(|r| r.on_run_end()).await;
    }
}
