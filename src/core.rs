//! Core domain types and service traits for JobWatch
//!
//! This module defines the data model shared by the background sampler and
//! the finalize-phase reader, and the trait contract the sampler uses to
//! talk to the host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// Returns the current wall-clock time in epoch milliseconds.
pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

// =============================================================================
// Process model
// =============================================================================

/// One row of the host process table, as reported by a [`HostProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Start time reported by the host, if it knows one.
    pub started_at: Option<Millis>,
    /// Missing or non-finite readings count as zero for peak tracking.
    pub cpu_percent: Option<f64>,
    pub mem_percent: Option<f64>,
}

/// A process currently believed to be running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProcess {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub start_time: Millis,
    pub peak_cpu_percent: f64,
    pub peak_mem_percent: f64,
}

// NaN and infinities have no JSON form and would make the saved document unreadable.
fn finite_or_zero(reading: Option<f64>) -> f64 {
    reading.filter(|v| v.is_finite()).unwrap_or(0.0)
}

impl TrackedProcess {
    /// Starts tracking a newly observed process.
    pub fn observed(info: &ProcessInfo, now: Millis) -> Self {
        Self {
            pid: info.pid,
            name: info.name.clone(),
            command: info.command.clone(),
            args: info.args.clone(),
            start_time: info.started_at.unwrap_or(now),
            peak_cpu_percent: finite_or_zero(info.cpu_percent),
            peak_mem_percent: finite_or_zero(info.mem_percent),
        }
    }

    /// Folds a fresh observation into the peaks. Identity fields are left alone.
    pub fn update_peaks(&mut self, info: &ProcessInfo) {
        self.peak_cpu_percent = self.peak_cpu_percent.max(finite_or_zero(info.cpu_percent));
        self.peak_mem_percent = self.peak_mem_percent.max(finite_or_zero(info.mem_percent));
    }

    /// Closes the lifecycle at `end_time`.
    pub fn complete(self, end_time: Millis) -> CompletedProcess {
        // A host-reported start time can sit slightly ahead of our clock.
        let end_time = end_time.max(self.start_time);
        CompletedProcess {
            pid: self.pid,
            name: self.name,
            command: self.command,
            args: self.args,
            start_time: self.start_time,
            end_time,
            duration: end_time - self.start_time,
            max_cpu: self.peak_cpu_percent,
            max_mem: self.peak_mem_percent,
        }
    }
}

/// A process known to have ended, with its lifetime statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedProcess {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub start_time: Millis,
    pub end_time: Millis,
    pub duration: Millis,
    pub max_cpu: f64,
    pub max_mem: f64,
}

impl CompletedProcess {
    /// The command line as a single string.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Persisted document of the process tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProcessState {
    pub tracked: Vec<TrackedProcess>,
    pub completed: Vec<CompletedProcess>,
}

// =============================================================================
// Metric model
// =============================================================================

/// The metric categories sampled on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricCategory {
    Cpu,
    Memory,
    Network,
    Disk,
    DiskSize,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 5] = [
        MetricCategory::Cpu,
        MetricCategory::Memory,
        MetricCategory::Network,
        MetricCategory::Disk,
        MetricCategory::DiskSize,
    ];
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricCategory::Cpu => "cpu",
            MetricCategory::Memory => "memory",
            MetricCategory::Network => "network",
            MetricCategory::Disk => "disk",
            MetricCategory::DiskSize => "diskSize",
        };
        f.write_str(name)
    }
}

/// A raw reading from the host, tagged by what it measures.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReading {
    CpuLoad {
        user_percent: f64,
        system_percent: f64,
    },
    Memory {
        total_bytes: u64,
        active_bytes: u64,
        available_bytes: u64,
    },
    NetworkThroughput {
        rx_bytes_per_sec: f64,
        tx_bytes_per_sec: f64,
    },
    DiskThroughput {
        read_bytes_per_sec: f64,
        write_bytes_per_sec: f64,
    },
    DiskCapacity {
        used_bytes: u64,
        available_bytes: u64,
    },
}

impl RawReading {
    /// The category this reading belongs to.
    pub fn category(&self) -> MetricCategory {
        match self {
            RawReading::CpuLoad { .. } => MetricCategory::Cpu,
            RawReading::Memory { .. } => MetricCategory::Memory,
            RawReading::NetworkThroughput { .. } => MetricCategory::Network,
            RawReading::DiskThroughput { .. } => MetricCategory::Disk,
            RawReading::DiskCapacity { .. } => MetricCategory::DiskSize,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub timestamp: Millis,
    pub user_load: f64,
    pub system_load: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub timestamp: Millis,
    pub total_mb: f64,
    pub active_mb: f64,
    pub available_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub timestamp: Millis,
    pub rx_mb: u64,
    pub tx_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskStats {
    pub timestamp: Millis,
    pub rx_mb: u64,
    pub wx_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskSizeStats {
    pub timestamp: Millis,
    pub used_mb: f64,
    pub available_mb: f64,
}

/// Persisted document of the metric accumulator: one ordered series per category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricHistograms {
    pub cpu: Vec<CpuStats>,
    pub memory: Vec<MemoryStats>,
    pub network: Vec<NetworkStats>,
    pub disk: Vec<DiskStats>,
    pub disk_size: Vec<DiskSizeStats>,
}

impl MetricHistograms {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty()
            && self.memory.is_empty()
            && self.network.is_empty()
            && self.disk.is_empty()
            && self.disk_size.is_empty()
    }
}

/// Everything the finalize phase read back from the background sampler.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collected {
    pub processes: ProcessState,
    pub metrics: MetricHistograms,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Errors surfaced by a [`HostProvider`].
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{category} reading unavailable: {reason}")]
    Unavailable {
        category: MetricCategory,
        reason: String,
    },
    #[error("process table unavailable: {0}")]
    ProcessTable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Supplies raw readings of the host the job runs on.
#[async_trait]
pub trait HostProvider: Send + Sync {
    /// Returns the current process table.
    async fn current_process_list(&self) -> Result<Vec<ProcessInfo>, ProviderError>;

    /// Returns the current reading for one metric category.
    ///
    /// Throughput categories report a rate in bytes per second; the
    /// accumulator converts it to a volume over the tick interval.
    async fn current_metric(&self, category: MetricCategory) -> Result<RawReading, ProviderError>;
}
