//! Metric history accumulation.
//!
//! Each tick fetches one raw reading per [`MetricCategory`] and appends a
//! normalized sample to that category's series. Categories are fetched and
//! appended independently: a failed reading skips only its own category for
//! that tick.

use crate::core::{
    CpuStats, DiskSizeStats, DiskStats, HostProvider, MemoryStats, MetricCategory,
    MetricHistograms, Millis, NetworkStats, RawReading,
};
use thiserror::Error;
use tracing::{debug, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A reading arrived for a different category than was asked for.
#[derive(Error, Debug, PartialEq)]
#[error("expected a {expected} reading, got {actual}")]
pub struct CategoryMismatch {
    pub expected: MetricCategory,
    pub actual: MetricCategory,
}

// Non-finite values cannot be written to the JSON document.
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Converts a byte rate into whole megabytes moved over `interval_ms`.
pub fn rate_to_volume_mb(bytes_per_sec: f64, interval_ms: u64) -> u64 {
    let bytes = finite_or_zero(bytes_per_sec).max(0.0) * (interval_ms as f64 / 1000.0);
    (bytes / 1024.0 / 1024.0).floor() as u64
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Owns the metric histories for one sampling run.
#[derive(Debug, Default)]
pub struct MetricAccumulator {
    histograms: MetricHistograms,
    last_tick: Option<Millis>,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_histograms(histograms: MetricHistograms) -> Self {
        Self {
            histograms,
            last_tick: None,
        }
    }

    pub fn histograms(&self) -> &MetricHistograms {
        &self.histograms
    }

    pub fn into_histograms(self) -> MetricHistograms {
        self.histograms
    }

    /// Samples every category at `now` and returns how many were appended.
    pub async fn record(&mut self, provider: &dyn HostProvider, now: Millis) -> usize {
        let interval_ms = match self.last_tick {
            Some(last) => now.saturating_sub(last).max(0) as u64,
            None => 0,
        };
        self.last_tick = Some(now);

        let mut appended = 0;
        for category in MetricCategory::ALL {
            let reading = match provider.current_metric(category).await {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(%category, error = %e, "Skipping metric for this tick");
                    continue;
                }
            };
            match self.append(category, reading, interval_ms, now) {
                Ok(()) => appended += 1,
                Err(e) => warn!(%category, error = %e, "Discarding mismatched reading"),
            }
        }
        debug!(appended, interval_ms, "Recorded metrics");
        appended
    }

    /// Normalizes one reading and appends it to its category's series.
    pub fn append(
        &mut self,
        category: MetricCategory,
        reading: RawReading,
        interval_ms: u64,
        now: Millis,
    ) -> Result<(), CategoryMismatch> {
        let actual = reading.category();
        if actual != category {
            return Err(CategoryMismatch {
                expected: category,
                actual,
            });
        }

        let h = &mut self.histograms;
        match reading {
            RawReading::CpuLoad {
                user_percent,
                system_percent,
            } => {
                let timestamp = next_timestamp(h.cpu.last().map(|s| s.timestamp), now);
                h.cpu.push(CpuStats {
                    timestamp,
                    user_load: finite_or_zero(user_percent),
                    system_load: finite_or_zero(system_percent),
                });
            }
            RawReading::Memory {
                total_bytes,
                active_bytes,
                available_bytes,
            } => {
                let timestamp = next_timestamp(h.memory.last().map(|s| s.timestamp), now);
                h.memory.push(MemoryStats {
                    timestamp,
                    total_mb: bytes_to_mb(total_bytes),
                    active_mb: bytes_to_mb(active_bytes),
                    available_mb: bytes_to_mb(available_bytes),
                });
            }
            RawReading::NetworkThroughput {
                rx_bytes_per_sec,
                tx_bytes_per_sec,
            } => {
                let timestamp = next_timestamp(h.network.last().map(|s| s.timestamp), now);
                h.network.push(NetworkStats {
                    timestamp,
                    rx_mb: rate_to_volume_mb(rx_bytes_per_sec, interval_ms),
                    tx_mb: rate_to_volume_mb(tx_bytes_per_sec, interval_ms),
                });
            }
            RawReading::DiskThroughput {
                read_bytes_per_sec,
                write_bytes_per_sec,
            } => {
                let timestamp = next_timestamp(h.disk.last().map(|s| s.timestamp), now);
                h.disk.push(DiskStats {
                    timestamp,
                    rx_mb: rate_to_volume_mb(read_bytes_per_sec, interval_ms),
                    wx_mb: rate_to_volume_mb(write_bytes_per_sec, interval_ms),
                });
            }
            RawReading::DiskCapacity {
                used_bytes,
                available_bytes,
            } => {
                let timestamp = next_timestamp(h.disk_size.last().map(|s| s.timestamp), now);
                h.disk_size.push(DiskSizeStats {
                    timestamp,
                    used_mb: bytes_to_mb(used_bytes),
                    available_mb: bytes_to_mb(available_bytes),
                });
            }
        }
        Ok(())
    }
}

// Keeps a series ordered if the wall clock steps backwards.
fn next_timestamp(last: Option<Millis>, now: Millis) -> Millis {
    last.map_or(now, |last| last.max(now))
}
