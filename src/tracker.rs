//! Process lifecycle tracking.
//!
//! Every tick the tracker diffs the current process table against the set of
//! processes it believes are running:
//!
//! - a PID seen for the first time starts a [`TrackedProcess`];
//! - a PID seen again has its CPU and memory peaks raised;
//! - a tracked PID missing from the table is moved to the completed list.
//!
//! A completed record is never revived. If the same PID number shows up
//! again it is a new process and gets a fresh tracked entry.

use crate::core::{CompletedProcess, Millis, ProcessInfo, ProcessState, TrackedProcess};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Outcome of a single [`ProcessTracker::observe`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ObserveSummary {
    pub started: usize,
    pub completed: usize,
    pub tracked: usize,
}

/// Owns the tracked and completed sets for one sampling run.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    tracked: BTreeMap<u32, TrackedProcess>,
    completed: Vec<CompletedProcess>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a tracker from a persisted document.
    pub fn from_state(state: ProcessState) -> Self {
        Self {
            tracked: state
                .tracked
                .into_iter()
                .map(|process| (process.pid, process))
                .collect(),
            completed: state.completed,
        }
    }

    /// Applies one snapshot of the process table taken at `now`.
    pub fn observe(&mut self, snapshot: &[ProcessInfo], now: Millis) -> ObserveSummary {
        let mut summary = ObserveSummary::default();
        let mut present = HashSet::with_capacity(snapshot.len());

        for info in snapshot {
            if !present.insert(info.pid) {
                trace!(pid = info.pid, "Duplicate PID in snapshot; ignoring repeat");
                continue;
            }
            match self.tracked.get_mut(&info.pid) {
                Some(tracked) => tracked.update_peaks(info),
                None => {
                    trace!(pid = info.pid, name = %info.name, "Process started");
                    self.tracked
                        .insert(info.pid, TrackedProcess::observed(info, now));
                    summary.started += 1;
                }
            }
        }

        let gone: Vec<u32> = self
            .tracked
            .keys()
            .filter(|pid| !present.contains(pid))
            .copied()
            .collect();
        for pid in gone {
            if let Some(tracked) = self.tracked.remove(&pid) {
                trace!(pid, name = %tracked.name, "Process completed");
                self.completed.push(tracked.complete(now));
                summary.completed += 1;
            }
        }

        summary.tracked = self.tracked.len();
        summary
    }

    /// Completes every remaining tracked process at `now`.
    ///
    /// All of them share the same end time, even if some actually exited
    /// earlier within the last tick window. Returns how many were completed.
    pub fn finalize(&mut self, now: Millis) -> usize {
        let remaining = std::mem::take(&mut self.tracked);
        let count = remaining.len();
        self.completed
            .extend(remaining.into_values().map(|tracked| tracked.complete(now)));
        debug!(count, "Force-finalized tracked processes");
        count
    }

    pub fn tracked(&self) -> impl Iterator<Item = &TrackedProcess> {
        self.tracked.values()
    }

    pub fn completed(&self) -> &[CompletedProcess] {
        &self.completed
    }

    pub fn is_tracking(&self, pid: u32) -> bool {
        self.tracked.contains_key(&pid)
    }

    /// Returns a serializable copy of the current state.
    pub fn state(&self) -> ProcessState {
        ProcessState {
            tracked: self.tracked.values().cloned().collect(),
            completed: self.completed.clone(),
        }
    }

    pub fn into_state(self) -> ProcessState {
        ProcessState {
            tracked: self.tracked.into_values().collect(),
            completed: self.completed,
        }
    }
}
