//! A scripted [`HostProvider`] for tests.

use crate::core::{HostProvider, MetricCategory, ProcessInfo, ProviderError, RawReading};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Replays queued process snapshots and returns fixed metric readings.
///
/// Once the queue is drained the last snapshot is repeated.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    snapshots: Mutex<VecDeque<Vec<ProcessInfo>>>,
    last_snapshot: Mutex<Vec<ProcessInfo>>,
    failing: Mutex<HashSet<MetricCategory>>,
    process_table_fails: Mutex<bool>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a snapshot to be returned by a later `current_process_list` call.
    pub fn push_snapshot(&self, snapshot: Vec<ProcessInfo>) {
        self.snapshots.lock().unwrap().push_back(snapshot);
    }

    /// Makes one metric category fail until cleared.
    pub fn fail_metric(&self, category: MetricCategory, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(category);
        } else {
            failing.remove(&category);
        }
    }

    pub fn fail_process_table(&self, fail: bool) {
        *self.process_table_fails.lock().unwrap() = fail;
    }

    /// A fixed reading for `category`.
    pub fn reading(category: MetricCategory) -> RawReading {
        const MIB: u64 = 1024 * 1024;
        match category {
            MetricCategory::Cpu => RawReading::CpuLoad {
                user_percent: 25.0,
                system_percent: 5.0,
            },
            MetricCategory::Memory => RawReading::Memory {
                total_bytes: 4096 * MIB,
                active_bytes: 1024 * MIB,
                available_bytes: 3072 * MIB,
            },
            MetricCategory::Network => RawReading::NetworkThroughput {
                rx_bytes_per_sec: 2.0 * MIB as f64,
                tx_bytes_per_sec: MIB as f64,
            },
            MetricCategory::Disk => RawReading::DiskThroughput {
                read_bytes_per_sec: MIB as f64,
                write_bytes_per_sec: 4.0 * MIB as f64,
            },
            MetricCategory::DiskSize => RawReading::DiskCapacity {
                used_bytes: 20_000 * MIB,
                available_bytes: 60_000 * MIB,
            },
        }
    }
}

/// Builds a process table row with the given peaks.
pub fn process(pid: u32, name: &str, cpu: f64, mem: f64) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        command: format!("/usr/bin/{name}"),
        args: vec![],
        started_at: None,
        cpu_percent: Some(cpu),
        mem_percent: Some(mem),
    }
}

#[async_trait]
impl HostProvider for ScriptedProvider {
    async fn current_process_list(&self) -> Result<Vec<ProcessInfo>, ProviderError> {
        if *self.process_table_fails.lock().unwrap() {
            return Err(ProviderError::ProcessTable("scripted failure".to_string()));
        }
        let mut last = self.last_snapshot.lock().unwrap();
        if let Some(next) = self.snapshots.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }

    async fn current_metric(&self, category: MetricCategory) -> Result<RawReading, ProviderError> {
        if self.failing.lock().unwrap().contains(&category) {
            return Err(ProviderError::Unavailable {
                category,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(Self::reading(category))
    }
}
