//! Turns human-supplied labels into unique, filesystem-safe identifiers.

use std::collections::{HashMap, HashSet};

/// Placeholder used when a play or task has no name.
pub const NO_NAME: &str = "no_name";

/// A resolved name: what to show and what to put on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    /// Human-facing name, `"name (N)"` for the Nth occurrence
    pub display: String,
    /// Filesystem identifier, `"base-N"` for the Nth occurrence
    pub file_id: String,
}

/// Replaces every character outside `[0-9A-Za-z_.-]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Occurrence counters for one naming scope.
///
/// Counters only ever grow, and every identifier handed out is remembered,
/// so a suffixed identifier can never shadow a later literal name.
#[derive(Debug, Default, Clone)]
pub struct NameRegistry {
    counters: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl NameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a play name.
    pub fn resolve_play(&mut self, raw: &str) -> ResolvedName {
        let name = normalize(raw);
        let base = sanitize(&name);
        self.resolve(&name, &base)
    }

    /// Resolves a task name; the action verb is part of the identifier.
    pub fn resolve_task(&mut self, raw: &str, action: &str) -> ResolvedName {
        let name = normalize(raw);
        let base = if action.is_empty() {
            sanitize(&name)
        } else {
            sanitize(&format!("{name}-{action}"))
        };
        self.resolve(&name, &base)
    }

    fn resolve(&mut self, display: &str, base: &str) -> ResolvedName {
        let occurrence = {
            let count = self.counters.entry(base.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        // the display follows the base's own count; only the id skips taken slots
        let mut suffix = occurrence;
        let file_id = loop {
            let candidate = if suffix == 1 {
                base.to_string()
            } else {
                format!("{base}-{suffix}")
            };
            if self.issued.insert(candidate.clone()) {
                break candidate;
            }
            suffix += 1;
        };

        let display = if occurrence == 1 {
            display.to_string()
        } else {
            format!("{display} ({occurrence})")
        };
        ResolvedName { display, file_id }
    }

    /// How many times a base identifier has been resolved.
    pub fn occurrences(&self, base: &str) -> usize {
        self.counters.get(base).copied().unwrap_or(0)
    }
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        NO_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
