//! Bounded window of the most recently discovered tasks.

use indexmap::IndexMap;
use serde::Serialize;

use super::counters::StatusCounts;
use super::status::HostStatus;

/// Default number of tasks kept in the window.
pub const DEFAULT_ACTIVITY_WINDOW: usize = 20;

/// Render-friendly summary of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskActivity {
    pub task_id: String,
    pub task_name: String,
    pub play_id: String,
    pub play_name: String,
    pub counts: StatusCounts,
}

/// FIFO-evicting ordered map of task activity.
///
/// Order is discovery order. Updating an entry never moves it, so eviction
/// always drops the task that was registered first.
#[derive(Debug, Clone)]
pub struct ActivityWindow {
    capacity: usize,
    entries: IndexMap<String, TaskActivity>,
}

impl Default for ActivityWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_WINDOW)
    }
}

impl ActivityWindow {
    /// Creates a window holding at most `capacity` tasks (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity + 1),
        }
    }

    /// Registers a task, evicting the oldest entries when over capacity.
    ///
    /// Re-registering a key already in the window leaves it untouched.
    pub fn push(&mut self, key: impl Into<String>, activity: TaskActivity) {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return;
        }
        self.entries.insert(key, activity);
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    /// Adds a classified result to the task's tally, if it is still in the window.
    pub fn record(&mut self, key: &str, increments: &[HostStatus]) {
        if let Some(entry) = self.entries.get_mut(key) {
            for status in increments {
                entry.counts.increment(*status);
            }
        }
    }

    /// Removes a result's tally again, used when a host is revisited.
    pub fn retract(&mut self, key: &str, increments: &[HostStatus]) {
        if let Some(entry) = self.entries.get_mut(key) {
            for status in increments {
                entry.counts.decrement(*status);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&TaskActivity> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TaskActivity> {
        self.entries.values()
    }

    /// Keys oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str) -> TaskActivity {
        TaskActivity {
            task_id: id.to_string(),
            task_name: id.to_string(),
            play_id: "play".to_string(),
            play_name: "play".to_string(),
            counts: StatusCounts::default(),
        }
    }

    #[test]
    fn test_fifo_eviction() {
        let mut window = ActivityWindow::with_capacity(3);
        for i in 1..=5 {
            window.push(format!("t{i}"), activity(&format!("t{i}")));
        }
        let keys: Vec<_> = window.keys().collect();
        assert_eq!(keys, vec!["t3", "t4", "t5"]);
    }

    #[test]
    fn test_update_does_not_reorder() {
        let mut window = ActivityWindow::with_capacity(2);
        window.push("a", activity("a"));
        window.push("b", activity("b"));
        window.record("a", &[HostStatus::Ok]);
        window.push("c", activity("c"));

        // "a" was updated last but registered first, so it goes
        assert!(window.get("a").is_none());
        assert_eq!(window.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_record_unknown_key_is_ignored() {
        let mut window = ActivityWindow::default();
        window.record("ghost", &[HostStatus::Failed]);
        assert!(window.is_empty());
        assert_eq!(window.capacity(), DEFAULT_ACTIVITY_WINDOW);
    }

    #[test]
    fn test_duplicate_push_is_noop() {
        let mut window = ActivityWindow::default();
        window.push("a", activity("a"));
        window.record("a", &[HostStatus::Ok]);
        window.push("a", activity("a"));
        assert_eq!(window.len(), 1);
        assert_eq!(window.get("a").map(|a| a.counts.ok), Some(1));
    }

    #[test]
    fn test_retract_replaces_a_revisited_result() {
        let mut window = ActivityWindow::default();
        window.push("a", activity("a"));
        window.record("a", &[HostStatus::Changed, HostStatus::Ok]);
        window.retract("a", &[HostStatus::Changed, HostStatus::Ok]);
        window.record("a", &[HostStatus::Failed]);
        window.retract("ghost", &[HostStatus::Ok]);

        let counts = &window.get("a").unwrap().counts;
        assert_eq!((counts.ok, counts.changed, counts.failed), (0, 0, 1));
    }
}
