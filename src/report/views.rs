//! Serializable snapshots of the store, shaped for templates.
//!
//! Views copy what they need out of the [`AggregationStore`]; templates never
//! see the store itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::recorder::names::sanitize;
use crate::recorder::{
    AggregationStore, HostStatus, PlayAggregate, ScopedCounters, StatusCounts, TaskActivity,
    TaskRecord, TimelineEntry,
};

/// One slice of a donut chart.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChartSlice {
    pub status: &'static str,
    pub value: u64,
}

/// Donut chart for one host or for all hosts.
#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    pub title: String,
    pub values: Vec<ChartSlice>,
}

impl ChartView {
    fn from_counts(title: impl Into<String>, counts: &StatusCounts) -> Self {
        let values = HostStatus::COUNTED
            .iter()
            .map(|s| ChartSlice {
                status: s.as_str(),
                value: counts.get(*s),
            })
            .filter(|slice| slice.value > 0)
            .collect();
        Self {
            title: title.into(),
            values,
        }
    }

    fn from_scope(counters: &ScopedCounters) -> Vec<Self> {
        std::iter::once(Self::from_counts("all", &counters.all))
            .chain(
                counters
                    .hosts
                    .iter()
                    .map(|(host, counts)| Self::from_counts(host.clone(), counts)),
            )
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HostCountsRow {
    pub host: String,
    pub counts: StatusCounts,
}

fn host_rows(counters: &ScopedCounters) -> Vec<HostCountsRow> {
    let mut rows: Vec<_> = counters
        .hosts
        .iter()
        .map(|(host, counts)| HostCountsRow {
            host: host.clone(),
            counts: counts.clone(),
        })
        .collect();
    rows.sort_by(|a, b| a.host.cmp(&b.host));
    rows
}

/// A play as listed from the run README.
#[derive(Debug, Clone, Serialize)]
pub struct PlaySummary {
    pub display: String,
    pub file_id: String,
    pub serial_batch: u32,
    pub task_count: usize,
    pub counts: StatusCounts,
    pub open: bool,
}

impl PlaySummary {
    fn new(play: &PlayAggregate) -> Self {
        Self {
            display: play.display.clone(),
            file_id: play.file_id.clone(),
            serial_batch: play.serial_batch,
            task_count: play.task_ids.len(),
            counts: play.counters.all.clone(),
            open: play.ended_at.is_none(),
        }
    }
}

/// Run-level README and charts.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub finished: bool,
    pub all: StatusCounts,
    pub hosts: Vec<HostCountsRow>,
    pub plays: Vec<PlaySummary>,
    pub activity: Vec<TaskActivity>,
    pub activity_capacity: usize,
    pub charts: Vec<ChartView>,
}

impl RunView {
    pub fn build(store: &AggregationStore) -> Self {
        let run = store.run();
        Self {
            started_at: run.started_at,
            ended_at: run.ended_at,
            finished: run.ended_at.is_some(),
            all: run.counters.all.clone(),
            hosts: host_rows(&run.counters),
            plays: run.plays.values().map(PlaySummary::new).collect(),
            activity: run.activity.iter().cloned().collect(),
            activity_capacity: run.activity.capacity(),
            charts: ChartView::from_scope(&run.counters),
        }
    }
}

/// Entries shown in `timeline.adoc` while the run is still going.
pub const DEFAULT_TIMELINE_WINDOW: usize = 200;

/// The run timeline, or its most recent entries.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineView<'a> {
    pub entries: &'a [TimelineEntry],
    /// Earlier entries left out of this rendering
    pub omitted: usize,
    pub finished: bool,
}

impl<'a> TimelineView<'a> {
    /// Keeps the last `window` entries; `None` keeps them all.
    pub fn build(store: &'a AggregationStore, window: Option<usize>) -> Self {
        let run = store.run();
        let all = run.timeline.as_slice();
        let omitted = window.map_or(0, |w| all.len().saturating_sub(w));
        Self {
            entries: &all[omitted..],
            omitted,
            finished: run.ended_at.is_some(),
        }
    }
}

/// One host section of a task view.
#[derive(Debug, Clone, Serialize)]
pub struct HostView {
    pub host: String,
    /// Filesystem-safe host name used for the raw JSON file
    pub file_stem: String,
    pub status: HostStatus,
    pub diff: Option<String>,
    /// Key message pulled out of the payload, if any
    pub msg: Option<String>,
    pub has_payload: bool,
}

/// Task detail view.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub display: String,
    pub file_id: String,
    pub play_id: String,
    pub play_name: String,
    pub action: String,
    pub tags: Vec<String>,
    pub source_location: Option<String>,
    pub has_rescue: bool,
    pub is_handler: bool,
    pub started_at: DateTime<Utc>,
    pub counts: StatusCounts,
    pub hosts: Vec<HostView>,
}

impl TaskView {
    pub fn build(play: &PlayAggregate, task: &TaskRecord) -> Self {
        let mut counts = StatusCounts::default();
        let hosts = task
            .sorted_hosts()
            .into_iter()
            .map(|(host, result)| {
                for status in &result.increments {
                    counts.increment(*status);
                }
                HostView {
                    host: host.to_string(),
                    file_stem: sanitize(host),
                    status: result.status,
                    diff: result.diff.clone(),
                    msg: payload_message(&result.payload),
                    has_payload: !result.payload.is_null(),
                }
            })
            .collect();

        Self {
            display: task.display.clone(),
            file_id: task.file_id.clone(),
            play_id: play.file_id.clone(),
            play_name: play.display.clone(),
            action: task.action.clone(),
            tags: task.tags.clone(),
            source_location: task.source_location.clone(),
            has_rescue: task.has_rescue,
            is_handler: task.is_handler,
            started_at: task.started_at,
            counts,
            hosts,
        }
    }
}

fn payload_message(payload: &JsonValue) -> Option<String> {
    ["msg", "skip_reason", "stderr"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|v| match v {
            JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
}

/// Play README, charts and "all results" views.
#[derive(Debug, Clone, Serialize)]
pub struct PlayView {
    pub display: String,
    pub file_id: String,
    pub stable_key: String,
    pub scope_key: String,
    pub serial_batch: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub all: StatusCounts,
    pub hosts: Vec<HostCountsRow>,
    pub charts: Vec<ChartView>,
    /// Every task identifier registered in this play, in order
    pub task_ids: Vec<String>,
}

impl PlayView {
    /// Builds the view of `play_id`, open or closed.
    pub fn build(store: &AggregationStore, play_id: &str) -> Option<Self> {
        let play = store.play(play_id)?;
        Some(Self {
            display: play.display.clone(),
            file_id: play.file_id.clone(),
            stable_key: play.stable_key.clone(),
            scope_key: play.scope_key.to_string(),
            serial_batch: play.serial_batch,
            started_at: play.started_at,
            ended_at: play.ended_at,
            all: play.counters.all.clone(),
            hosts: host_rows(&play.counters),
            charts: ChartView::from_scope(&play.counters),
            task_ids: play.task_ids.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::TaskInfo;
    use crate::recorder::OutcomeKind;
    use serde_json::json;

    fn populated() -> AggregationStore {
        let mut store = AggregationStore::default();
        store.start_run();
        store.start_play("site", "p1", None);
        let info = TaskInfo {
            key: "t1".into(),
            name: "Install package".into(),
            action: "pkg".into(),
            tags: vec!["setup".into()],
            source_location: Some("site.yml:4".into()),
        };
        store.start_task(&info, false, false);
        store.record_result("t1", "web2", OutcomeKind::Ok, false, json!({"changed": true, "msg": "installed"}));
        store.record_result("t1", "web1", OutcomeKind::Ok, false, json!({"changed": false}));
        store
    }

    #[test]
    fn test_task_view_hosts_sorted() {
        let store = populated();
        let play = store.current_play().unwrap();
        let task = TaskView::build(play, store.task("Install_package-pkg").unwrap());
        let hosts: Vec<_> = task.hosts.iter().map(|h| h.host.as_str()).collect();
        assert_eq!(hosts, vec!["web1", "web2"]);
        assert_eq!(task.hosts[1].msg.as_deref(), Some("installed"));
        // counted like the run counters: changed also counts ok
        assert_eq!(task.counts.changed, 1);
        assert_eq!(task.counts.ok, 2);
        assert_eq!(task.counts, store.run().counters.all);
    }

    #[test]
    fn test_timeline_window_keeps_latest() {
        let mut store = populated();
        store.record_result("t1", "db1", OutcomeKind::Failed, false, json!({}));

        let view = TimelineView::build(&store, Some(2));
        assert_eq!(view.omitted, 1);
        let hosts: Vec<_> = view.entries.iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, vec!["web1", "db1"]);

        let full = TimelineView::build(&store, None);
        assert_eq!((full.omitted, full.entries.len()), (0, 3));
        assert_eq!(TimelineView::build(&store, Some(10)).entries.len(), 3);
    }

    #[test]
    fn test_charts_skip_zero_slices() {
        let store = populated();
        let view = RunView::build(&store);
        assert_eq!(view.charts[0].title, "all");
        assert_eq!(
            view.charts[0].values,
            vec![
                ChartSlice { status: "ok", value: 2 },
                ChartSlice { status: "changed", value: 1 }
            ]
        );
        assert_eq!(view.charts.len(), 3);
    }

    #[test]
    fn test_closed_play_keeps_counters() {
        let mut store = populated();
        store.close_play();
        let view = PlayView::build(&store, "site").unwrap();
        assert!(view.ended_at.is_some());
        assert_eq!(view.task_ids, vec!["Install_package-pkg".to_string()]);
        assert_eq!(view.all.ok, 2);
    }
}
