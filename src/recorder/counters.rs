//! Per-status tallies, per host and across all hosts.

use indexmap::IndexMap;
use serde::Serialize;

use super::status::HostStatus;

/// Count of results per canonical status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub ok: u64,
    pub changed: u64,
    pub failed: u64,
    pub unreachable: u64,
    pub skipped: u64,
    pub ignored_failed: u64,
    pub rescued: u64,
}

impl StatusCounts {
    /// Adds one to the counter for `status`. `Running` is never counted.
    pub fn increment(&mut self, status: HostStatus) {
        if let Some(slot) = self.slot_mut(status) {
            *slot += 1;
        }
    }

    /// Removes one from the counter for `status`, never going below zero.
    pub fn decrement(&mut self, status: HostStatus) {
        if let Some(slot) = self.slot_mut(status) {
            *slot = slot.saturating_sub(1);
        }
    }

    /// Current count for `status`.
    pub fn get(&self, status: HostStatus) -> u64 {
        match status {
            HostStatus::Ok => self.ok,
            HostStatus::Changed => self.changed,
            HostStatus::Failed => self.failed,
            HostStatus::Unreachable => self.unreachable,
            HostStatus::Skipped => self.skipped,
            HostStatus::IgnoredFailed => self.ignored_failed,
            HostStatus::Rescued => self.rescued,
            HostStatus::Running => 0,
        }
    }

    /// Sum over every counted status.
    pub fn total(&self) -> u64 {
        HostStatus::COUNTED.iter().map(|s| self.get(*s)).sum()
    }

    fn slot_mut(&mut self, status: HostStatus) -> Option<&mut u64> {
        match status {
            HostStatus::Ok => Some(&mut self.ok),
            HostStatus::Changed => Some(&mut self.changed),
            HostStatus::Failed => Some(&mut self.failed),
            HostStatus::Unreachable => Some(&mut self.unreachable),
            HostStatus::Skipped => Some(&mut self.skipped),
            HostStatus::IgnoredFailed => Some(&mut self.ignored_failed),
            HostStatus::Rescued => Some(&mut self.rescued),
            HostStatus::Running => None,
        }
    }
}

/// Counters for one scope (a play or the whole run).
///
/// Every host-level increment is mirrored into `all`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScopedCounters {
    /// Per-host tallies, in order of first result
    pub hosts: IndexMap<String, StatusCounts>,
    /// Aggregate over all hosts
    pub all: StatusCounts,
}

impl ScopedCounters {
    /// Applies every increment of one classified result for `host`.
    pub fn record(&mut self, host: &str, increments: &[HostStatus]) {
        let per_host = self.hosts.entry(host.to_string()).or_default();
        for status in increments {
            per_host.increment(*status);
            self.all.increment(*status);
        }
    }

    /// Undoes a previously recorded set of increments for `host`.
    pub fn retract(&mut self, host: &str, increments: &[HostStatus]) {
        if let Some(per_host) = self.hosts.get_mut(host) {
            for status in increments {
                per_host.decrement(*status);
                self.all.decrement(*status);
            }
        }
    }

    /// Tally for a single host, zeroed if the host has no results yet.
    pub fn host(&self, host: &str) -> StatusCounts {
        self.hosts.get(host).cloned().unwrap_or_default()
    }

    /// Sum of one status across every host bucket.
    pub fn sum_hosts(&self, status: HostStatus) -> u64 {
        self.hosts.values().map(|c| c.get(status)).sum()
    }
}
