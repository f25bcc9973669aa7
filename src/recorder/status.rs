//! Canonical host statuses and the result classifier.
//!
//! The engine reports one of four raw outcomes. The classifier folds in the
//! task context (ignore-errors, enclosing rescue block) and the payload's
//! change flags to decide the canonical status *and* every counter that has
//! to move with it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Canonical status of one (task, host) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// No result has landed yet
    Running,
    /// Succeeded without change
    Ok,
    /// Succeeded with change
    Changed,
    /// Failed
    Failed,
    /// Host could not be reached
    Unreachable,
    /// Skipped by a condition
    Skipped,
    /// Failed with `ignore_errors`
    IgnoredFailed,
    /// Failed inside a block that has a rescue section
    Rescued,
}

impl HostStatus {
    /// Statuses that are tallied in counters, in display order.
    pub const COUNTED: [HostStatus; 7] = [
        HostStatus::Ok,
        HostStatus::Changed,
        HostStatus::Failed,
        HostStatus::Unreachable,
        HostStatus::Skipped,
        HostStatus::IgnoredFailed,
        HostStatus::Rescued,
    ];

    /// Snake-case label used in templates and file contents.
    pub fn as_str(self) -> &'static str {
        match self {
            HostStatus::Running => "running",
            HostStatus::Ok => "ok",
            HostStatus::Changed => "changed",
            HostStatus::Failed => "failed",
            HostStatus::Unreachable => "unreachable",
            HostStatus::Skipped => "skipped",
            HostStatus::IgnoredFailed => "ignored_failed",
            HostStatus::Rescued => "rescued",
        }
    }

    /// Glyph used in rendered views.
    pub fn glyph(self) -> &'static str {
        glyph_for(self.as_str())
    }
}

/// Glyph for a status label; unknown labels get a question mark.
pub fn glyph_for(label: &str) -> &'static str {
    match label {
        "ok" => "🟢",
        "changed" => "🟠",
        "failed" => "🔴",
        "ignored_failed" => "pass:[<s>🔴</s>]🔵",
        "skipped" => "🔵",
        "unreachable" => "💀",
        "rescued" => "pass:[<s>🔴</s>]🟣",
        "running" => "⏳",
        _ => "❔",
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw outcome reported by the engine for one host.
///
/// Anything the engine sends that is not one of the known kinds is kept as
/// `Unknown` and classified as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutcomeKind {
    /// Module returned normally
    Ok,
    /// Module failed
    Failed,
    /// Host unreachable
    Unreachable,
    /// Task skipped
    Skipped,
    /// Unrecognized kind
    Unknown,
}

impl From<&str> for OutcomeKind {
    fn from(kind: &str) -> Self {
        match kind {
            "ok" => OutcomeKind::Ok,
            "failed" => OutcomeKind::Failed,
            "unreachable" => OutcomeKind::Unreachable,
            "skipped" => OutcomeKind::Skipped,
            _ => OutcomeKind::Unknown,
        }
    }
}

impl From<String> for OutcomeKind {
    fn from(kind: String) -> Self {
        OutcomeKind::from(kind.as_str())
    }
}

impl From<OutcomeKind> for String {
    fn from(kind: OutcomeKind) -> Self {
        match kind {
            OutcomeKind::Ok => "ok",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Unreachable => "unreachable",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Unknown => "unknown",
        }
        .to_string()
    }
}

/// Outcome of classifying one host result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Status stored on the host result
    pub status: HostStatus,
    /// Every counter to increment, primary status first
    pub increments: Vec<HostStatus>,
}

/// Maps a raw outcome plus its context to the canonical status.
pub fn classify(
    outcome: OutcomeKind,
    ignore_errors: bool,
    has_rescue: bool,
    payload: &JsonValue,
) -> Classification {
    match outcome {
        OutcomeKind::Ok if payload_changed(payload) => Classification {
            status: HostStatus::Changed,
            increments: vec![HostStatus::Changed, HostStatus::Ok],
        },
        OutcomeKind::Ok => single(HostStatus::Ok),
        OutcomeKind::Unreachable => single(HostStatus::Unreachable),
        OutcomeKind::Skipped => single(HostStatus::Skipped),
        OutcomeKind::Failed | OutcomeKind::Unknown if ignore_errors => {
            let mut increments = vec![HostStatus::IgnoredFailed, HostStatus::Ok];
            if nested_change(payload) {
                increments.push(HostStatus::Changed);
            }
            Classification {
                status: HostStatus::IgnoredFailed,
                increments,
            }
        }
        OutcomeKind::Failed | OutcomeKind::Unknown if has_rescue => single(HostStatus::Rescued),
        OutcomeKind::Failed | OutcomeKind::Unknown => single(HostStatus::Failed),
    }
}

fn single(status: HostStatus) -> Classification {
    Classification {
        status,
        increments: vec![status],
    }
}

/// Whether the payload's top-level change flag is set.
pub fn payload_changed(payload: &JsonValue) -> bool {
    payload
        .get("changed")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

/// Whether any loop sub-result in `results` reports a change.
pub fn nested_change(payload: &JsonValue) -> bool {
    payload
        .get("results")
        .and_then(JsonValue::as_array)
        .is_some_and(|results| results.iter().any(payload_changed))
}
