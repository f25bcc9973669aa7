//! In-memory model of the current run.
//!
//! The store is the single source of truth for everything rendered. It owns
//! the run, the plays seen so far (identifier and counters only once closed),
//! the working set of tasks for the open play, and the recent-activity
//! window. Every mutation funnels through the methods here; nothing in the
//! store performs I/O.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};
use uuid::Uuid;

use super::activity::{ActivityWindow, TaskActivity, DEFAULT_ACTIVITY_WINDOW};
use super::counters::{ScopedCounters, StatusCounts};
use super::diff::extract_diff;
use super::names::NameRegistry;
use super::status::{classify, HostStatus, OutcomeKind};
use crate::callback::TaskInfo;

/// Outcome for one (task, host) pair.
#[derive(Debug, Clone, Serialize)]
pub struct HostResult {
    pub status: HostStatus,
    /// ANSI-stripped unified diff, if the module reported one
    pub diff: Option<String>,
    /// Raw result payload as sent by the engine
    pub payload: JsonValue,
    pub updated_at: DateTime<Utc>,
    /// Counters this result currently contributes, retracted on revisit
    #[serde(skip)]
    pub increments: Vec<HostStatus>,
}

impl HostResult {
    fn running() -> Self {
        Self {
            status: HostStatus::Running,
            diff: None,
            payload: JsonValue::Null,
            updated_at: Utc::now(),
            increments: Vec::new(),
        }
    }
}

/// Identity of a task within one serial batch of a play.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalTaskKey {
    pub key: String,
    pub batch: u32,
}

/// One task (or handler) of the open play.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub key: String,
    pub display: String,
    pub file_id: String,
    pub action: String,
    pub tags: Vec<String>,
    pub source_location: Option<String>,
    pub has_rescue: bool,
    pub is_handler: bool,
    pub started_at: DateTime<Utc>,
    pub hosts: IndexMap<String, HostResult>,
}

impl TaskRecord {
    /// Per-host results sorted by host name.
    pub fn sorted_hosts(&self) -> Vec<(&str, &HostResult)> {
        let mut hosts: Vec<_> = self.hosts.iter().map(|(h, r)| (h.as_str(), r)).collect();
        hosts.sort_by(|a, b| a.0.cmp(b.0));
        hosts
    }
}

/// A play as remembered by the run.
#[derive(Debug, Clone, Serialize)]
pub struct PlayAggregate {
    pub display: String,
    pub file_id: String,
    /// Engine-provided key, shared by every serial batch of the play
    pub stable_key: String,
    /// Fresh per opening, distinguishes batches of the same play
    pub scope_key: Uuid,
    pub serial_batch: u32,
    pub task_ids: Vec<String>,
    pub counters: ScopedCounters,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One entry of the run-wide timeline, in result completion order.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub play_id: String,
    pub task_id: String,
    pub task_name: String,
    pub host: String,
    pub status: HostStatus,
}

/// Top-level state of one execution.
#[derive(Debug, Clone)]
pub struct Run {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub plays: IndexMap<String, PlayAggregate>,
    pub counters: ScopedCounters,
    pub activity: ActivityWindow,
    pub timeline: Vec<TimelineEntry>,
}

impl Run {
    fn new(activity_capacity: usize) -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            plays: IndexMap::new(),
            counters: ScopedCounters::default(),
            activity: ActivityWindow::with_capacity(activity_capacity),
            timeline: Vec::new(),
        }
    }
}

/// Working set of the play currently executing.
#[derive(Debug, Clone, Default)]
pub struct OpenPlay {
    pub play_id: String,
    pub tasks: IndexMap<LogicalTaskKey, TaskRecord>,
}

impl OpenPlay {
    /// Looks a task up by its filesystem identifier.
    pub fn task_by_id(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.values().find(|t| t.file_id == task_id)
    }
}

/// Where a task landed after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub play_id: String,
    pub task_id: String,
    /// False when the task was already registered in this batch
    pub created: bool,
}

/// Where a host result landed after recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRef {
    pub play_id: String,
    pub task_id: String,
    pub host: String,
    pub status: HostStatus,
    pub increments: Vec<HostStatus>,
}

/// The aggregation store.
#[derive(Debug)]
pub struct AggregationStore {
    run: Run,
    open: Option<OpenPlay>,
    play_names: NameRegistry,
    task_names: NameRegistry,
    /// Highest serial batch seen per stable play key
    batches: HashMap<String, u32>,
    activity_capacity: usize,
}

impl Default for AggregationStore {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_WINDOW)
    }
}

impl AggregationStore {
    /// Creates a store with the given recent-activity capacity.
    pub fn new(activity_capacity: usize) -> Self {
        Self {
            run: Run::new(activity_capacity),
            open: None,
            play_names: NameRegistry::new(),
            task_names: NameRegistry::new(),
            batches: HashMap::new(),
            activity_capacity,
        }
    }

    /// Resets everything for a fresh run.
    pub fn start_run(&mut self) {
        *self = Self::new(self.activity_capacity);
        debug!(started_at = %self.run.started_at, "run started");
    }

    /// Opens a play, closing the previous one first.
    ///
    /// `serial_batch` is authoritative when given. Otherwise a stable key
    /// that was already seen in this run (the open play included) marks a
    /// re-entry and gets the next batch number.
    pub fn start_play(&mut self, name: &str, stable_key: &str, serial_batch: Option<u32>) -> String {
        self.close_play();

        let last = self.batches.get(stable_key).copied();
        let batch = match (serial_batch, last) {
            (Some(explicit), _) => explicit,
            (None, Some(previous)) => previous + 1,
            (None, None) => 0,
        };
        let highest = last.map_or(batch, |previous| previous.max(batch));
        self.batches.insert(stable_key.to_string(), highest);

        let resolved = self.play_names.resolve_play(name);
        let play = PlayAggregate {
            display: resolved.display,
            file_id: resolved.file_id.clone(),
            stable_key: stable_key.to_string(),
            scope_key: Uuid::new_v4(),
            serial_batch: batch,
            task_ids: Vec::new(),
            counters: ScopedCounters::default(),
            started_at: Utc::now(),
            ended_at: None,
        };
        debug!(play = %play.display, id = %play.file_id, batch, "play opened");

        self.run.plays.insert(resolved.file_id.clone(), play);
        self.open = Some(OpenPlay {
            play_id: resolved.file_id.clone(),
            tasks: IndexMap::new(),
        });
        resolved.file_id
    }

    /// Closes the open play and frees its task map. Returns its identifier.
    pub fn close_play(&mut self) -> Option<String> {
        let open = self.open.take()?;
        if let Some(play) = self.run.plays.get_mut(&open.play_id) {
            play.ended_at.get_or_insert_with(Utc::now);
        }
        debug!(play = %open.play_id, tasks = open.tasks.len(), "play closed");
        Some(open.play_id)
    }

    /// Marks the run as finished, closing the open play.
    pub fn end_run(&mut self) -> Option<String> {
        let closed = self.close_play();
        self.run.ended_at.get_or_insert_with(Utc::now);
        closed
    }

    /// Registers a task in the open play; a no-op if already registered in
    /// the same serial batch. Returns `None` when no play is open.
    pub fn start_task(&mut self, task: &TaskInfo, has_rescue: bool, is_handler: bool) -> Option<TaskRef> {
        let open = self.open.as_mut()?;
        let play = self.run.plays.get_mut(&open.play_id)?;
        let logical = LogicalTaskKey {
            key: task.key.clone(),
            batch: play.serial_batch,
        };

        if let Some(existing) = open.tasks.get(&logical) {
            trace!(task = %existing.file_id, "task already registered");
            return Some(TaskRef {
                play_id: open.play_id.clone(),
                task_id: existing.file_id.clone(),
                created: false,
            });
        }

        let resolved = self.task_names.resolve_task(&task.name, &task.action);
        let record = TaskRecord {
            key: task.key.clone(),
            display: resolved.display.clone(),
            file_id: resolved.file_id.clone(),
            action: task.action.clone(),
            tags: task.tags.clone(),
            source_location: task.source_location.clone(),
            has_rescue,
            is_handler,
            started_at: Utc::now(),
            hosts: IndexMap::new(),
        };
        open.tasks.insert(logical, record);
        play.task_ids.push(resolved.file_id.clone());

        self.run.activity.push(
            resolved.file_id.clone(),
            TaskActivity {
                task_id: resolved.file_id.clone(),
                task_name: resolved.display,
                play_id: play.file_id.clone(),
                play_name: play.display.clone(),
                counts: StatusCounts::default(),
            },
        );
        debug!(task = %resolved.file_id, handler = is_handler, "task registered");

        Some(TaskRef {
            play_id: open.play_id.clone(),
            task_id: resolved.file_id,
            created: true,
        })
    }

    /// Classifies and records one host result. Unknown task keys are skipped.
    pub fn record_result(
        &mut self,
        task_key: &str,
        host: &str,
        outcome: OutcomeKind,
        ignore_errors: bool,
        payload: JsonValue,
    ) -> Option<ResultRef> {
        let open = self.open.as_mut()?;
        let play = self.run.plays.get_mut(&open.play_id)?;
        let logical = LogicalTaskKey {
            key: task_key.to_string(),
            batch: play.serial_batch,
        };
        let Some(task) = open.tasks.get_mut(&logical) else {
            debug!(task_key, host, "result for unknown task ignored");
            return None;
        };

        let classification = classify(outcome, ignore_errors, task.has_rescue, &payload);
        let now = Utc::now();
        let entry = task
            .hosts
            .entry(host.to_string())
            .or_insert_with(HostResult::running);
        // a revisited host counts once, with its final status
        let previous = std::mem::replace(&mut entry.increments, classification.increments.clone());
        if !previous.is_empty() {
            trace!(task = %task.file_id, host, "host revisited, retracting previous result");
            play.counters.retract(host, &previous);
            self.run.counters.retract(host, &previous);
            self.run.activity.retract(&task.file_id, &previous);
        }
        entry.status = classification.status;
        entry.payload = payload;
        entry.updated_at = now;

        play.counters.record(host, &classification.increments);
        self.run.counters.record(host, &classification.increments);
        self.run.activity.record(&task.file_id, &classification.increments);

        let seq = self.run.timeline.len() as u64 + 1;
        self.run.timeline.push(TimelineEntry {
            seq,
            at: now,
            play_id: play.file_id.clone(),
            task_id: task.file_id.clone(),
            task_name: task.display.clone(),
            host: host.to_string(),
            status: classification.status,
        });
        trace!(task = %task.file_id, host, status = %classification.status, "result recorded");

        Some(ResultRef {
            play_id: play.file_id.clone(),
            task_id: task.file_id.clone(),
            host: host.to_string(),
            status: classification.status,
            increments: classification.increments,
        })
    }

    /// Attaches a diff to a host result, creating a `running` entry if no
    /// result has landed yet. Returns the task identifier when a diff was kept.
    pub fn record_diff(&mut self, task_key: &str, host: &str, payload: &JsonValue) -> Option<String> {
        let open = self.open.as_mut()?;
        let batch = self.run.plays.get(&open.play_id)?.serial_batch;
        let logical = LogicalTaskKey {
            key: task_key.to_string(),
            batch,
        };
        let task = open.tasks.get_mut(&logical)?;
        let diff = extract_diff(payload)?;

        task.hosts
            .entry(host.to_string())
            .or_insert_with(HostResult::running)
            .diff = Some(diff);
        Some(task.file_id.clone())
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn open_play(&self) -> Option<&OpenPlay> {
        self.open.as_ref()
    }

    pub fn play(&self, play_id: &str) -> Option<&PlayAggregate> {
        self.run.plays.get(play_id)
    }

    /// The open play's aggregate, if any.
    pub fn current_play(&self) -> Option<&PlayAggregate> {
        self.open.as_ref().and_then(|o| self.run.plays.get(&o.play_id))
    }

    /// Looks up a task of the open play by its filesystem identifier.
    pub fn task(&self, task_id: &str) -> Option<&TaskRecord> {
        self.open.as_ref()?.task_by_id(task_id)
    }
}
