//! Lifecycle events emitted by the orchestration engine.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::recorder::OutcomeKind;

/// Static attributes of a task or handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Engine-assigned key, stable for the task definition
    pub key: String,
    /// Human name, may be empty or duplicated
    #[serde(default)]
    pub name: String,
    /// Action (module) name
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Where the task is defined, e.g. `site.yml:12`
    #[serde(default)]
    pub source_location: Option<String>,
}

impl TaskInfo {
    /// Creates a task with no tags or source location.
    pub fn new(key: impl Into<String>, name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            action: action.into(),
            tags: Vec::new(),
            source_location: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source_location(mut self, location: impl Into<String>) -> Self {
        self.source_location = Some(location.into());
        self
    }
}

/// One lifecycle event, as read from an event stream.
///
/// Serialized with an `event` tag, one JSON object per line:
///
/// ```json
/// {"event": "play_start", "name": "web", "key": "play-1"}
/// {"event": "host_result", "task_key": "t1", "host": "web1", "outcome": "ok", "payload": {"changed": true}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStart,
    PlayStart {
        name: String,
        /// Stable key shared by every serial batch of the play
        key: String,
        /// Explicit batch index, when the engine provides one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        serial_batch: Option<u32>,
    },
    TaskStart {
        task: TaskInfo,
        #[serde(default)]
        has_rescue: bool,
    },
    HandlerNotify {
        task: TaskInfo,
    },
    HostResult {
        task_key: String,
        host: String,
        outcome: OutcomeKind,
        #[serde(default)]
        ignore_errors: bool,
        #[serde(default)]
        payload: JsonValue,
    },
    FileDiff {
        task_key: String,
        host: String,
        payload: JsonValue,
    },
    RunEnd,
}

impl RunEvent {
    /// Snake-case name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::RunStart => "run_start",
            RunEvent::PlayStart { .. } => "play_start",
            RunEvent::TaskStart { .. } => "task_start",
            RunEvent::HandlerNotify { .. } => "handler_notify",
            RunEvent::HostResult { .. } => "host_result",
            RunEvent::FileDiff { .. } => "file_diff",
            RunEvent::RunEnd => "run_end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_event_lines() {
        let start: RunEvent = serde_json::from_str(r#"{"event":"run_start"}"#).unwrap();
        assert_eq!(start, RunEvent::RunStart);

        let play: RunEvent =
            serde_json::from_str(r#"{"event":"play_start","name":"web","key":"p1"}"#).unwrap();
        assert_eq!(
            play,
            RunEvent::PlayStart {
                name: "web".into(),
                key: "p1".into(),
                serial_batch: None
            }
        );

        let task: RunEvent = serde_json::from_value(json!({
            "event": "task_start",
            "task": {"key": "t1", "name": "Install", "action": "pkg", "tags": ["a"]}
        }))
        .unwrap();
        match task {
            RunEvent::TaskStart { task, has_rescue } => {
                assert_eq!(task.tags, vec!["a".to_string()]);
                assert!(!has_rescue);
                assert!(task.source_location.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_host_result_defaults() {
        let event: RunEvent = serde_json::from_value(json!({
            "event": "host_result", "task_key": "t1", "host": "h", "outcome": "weird"
        }))
        .unwrap();
        match event {
            RunEvent::HostResult {
                outcome,
                ignore_errors,
                payload,
                ..
            } => {
                assert_eq!(outcome, OutcomeKind::Unknown);
                assert!(!ignore_errors);
                assert!(payload.is_null());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_task_info_builder() {
        let info = TaskInfo::new("k", "n", "a")
            .with_tags(["x", "y"])
            .with_source_location("site.yml:3");
        assert_eq!(info.tags.len(), 2);
        assert_eq!(info.source_location.as_deref(), Some("site.yml:3"));
        assert_eq!(RunEvent::HandlerNotify { task: info }.kind(), "handler_notify");
    }
}
