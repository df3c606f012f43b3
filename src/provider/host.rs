//! `sysinfo`-backed host readings.

use super::cpu::{self, CpuTimes};
use super::disk::{self, ProcessIoTotals};
use super::CounterRate;
use crate::core::{HostProvider, MetricCategory, ProcessInfo, ProviderError, RawReading};
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, System};
use tokio::sync::Mutex;
use tracing::trace;

const PROC_STAT: &str = "/proc/stat";
const PROC_DISKSTATS: &str = "/proc/diskstats";

// Below this age the process table is reused instead of refreshed again, so
// the disk reading does not reset per-process CPU accounting mid-tick.
const PROCESS_REFRESH_REUSE: Duration = Duration::from_millis(500);

struct HostState {
    system: System,
    networks: Networks,
    disks: Disks,
    processes_refreshed_at: Option<Instant>,
    cpu_times: Option<CpuTimes>,
    process_io: ProcessIoTotals,
    network_rate: CounterRate,
    disk_rate: CounterRate,
}

impl HostState {
    fn refresh_processes(&mut self, now: Instant) {
        let fresh = self
            .processes_refreshed_at
            .is_some_and(|at| now.saturating_duration_since(at) < PROCESS_REFRESH_REUSE);
        if !fresh {
            self.system.refresh_processes();
            self.processes_refreshed_at = Some(now);
            self.process_io
                .record(self.system.processes().values().map(|process| {
                    let usage = process.disk_usage();
                    (usage.read_bytes, usage.written_bytes)
                }));
        }
    }
}

/// Reads the process table and host metrics of the machine the job runs on.
pub struct HostMetricsProvider {
    state: Mutex<HostState>,
    own_pid: u32,
}

impl HostMetricsProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();
        Self {
            state: Mutex::new(HostState {
                system,
                networks: Networks::new_with_refreshed_list(),
                disks: Disks::new_with_refreshed_list(),
                processes_refreshed_at: None,
                cpu_times: None,
                process_io: ProcessIoTotals::default(),
                network_rate: CounterRate::default(),
                disk_rate: CounterRate::default(),
            }),
            own_pid: std::process::id(),
        }
    }

    fn cpu_load(state: &mut HostState) -> Result<RawReading, ProviderError> {
        match std::fs::read_to_string(PROC_STAT) {
            Ok(content) => {
                let current = cpu::parse_proc_stat(&content).ok_or_else(|| {
                    ProviderError::Unavailable {
                        category: MetricCategory::Cpu,
                        reason: format!("unrecognized {PROC_STAT} format"),
                    }
                })?;
                let (user_percent, system_percent) =
                    cpu::load_between(state.cpu_times.as_ref(), &current);
                state.cpu_times = Some(current);
                Ok(RawReading::CpuLoad {
                    user_percent,
                    system_percent,
                })
            }
            Err(e) => {
                // No user/system split off Linux; report the total as user load.
                trace!(error = %e, "Falling back to sysinfo global CPU usage");
                state.system.refresh_cpu();
                Ok(RawReading::CpuLoad {
                    user_percent: state.system.global_cpu_info().cpu_usage() as f64,
                    system_percent: 0.0,
                })
            }
        }
    }

    fn memory(state: &mut HostState) -> RawReading {
        state.system.refresh_memory();
        let total_bytes = state.system.total_memory();
        let available_bytes = state.system.available_memory();
        RawReading::Memory {
            total_bytes,
            active_bytes: state.system.used_memory(),
            available_bytes,
        }
    }

    fn network(state: &mut HostState, now: Instant) -> RawReading {
        state.networks.refresh();
        let (rx, tx) = state
            .networks
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx + data.total_received(), tx + data.total_transmitted())
            });
        let (rx_bytes_per_sec, tx_bytes_per_sec) = state.network_rate.update(rx, tx, now);
        RawReading::NetworkThroughput {
            rx_bytes_per_sec,
            tx_bytes_per_sec,
        }
    }

    fn disk_io(state: &mut HostState, now: Instant) -> RawReading {
        let totals = match std::fs::read_to_string(PROC_DISKSTATS)
            .ok()
            .and_then(|content| disk::parse_diskstats(&content))
        {
            Some(totals) => totals,
            None => {
                trace!("Falling back to per-process disk usage");
                state.refresh_processes(now);
                state.process_io.totals()
            }
        };
        let (read_bytes_per_sec, write_bytes_per_sec) =
            state.disk_rate.update(totals.read_bytes, totals.written_bytes, now);
        RawReading::DiskThroughput {
            read_bytes_per_sec,
            write_bytes_per_sec,
        }
    }

    fn disk_capacity(state: &mut HostState) -> Result<RawReading, ProviderError> {
        state.disks.refresh();
        let disks = state.disks.list();
        let root = disks
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .or_else(|| disks.first())
            .ok_or_else(|| ProviderError::Unavailable {
                category: MetricCategory::DiskSize,
                reason: "no mounted disks".to_string(),
            })?;
        let total = root.total_space();
        let available_bytes = root.available_space();
        Ok(RawReading::DiskCapacity {
            used_bytes: total.saturating_sub(available_bytes),
            available_bytes,
        })
    }
}

impl Default for HostMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostProvider for HostMetricsProvider {
    async fn current_process_list(&self) -> Result<Vec<ProcessInfo>, ProviderError> {
        let mut state = self.state.lock().await;
        state.system.refresh_memory();
        state.refresh_processes(Instant::now());

        let total_memory = state.system.total_memory();
        let list = state
            .system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != self.own_pid)
            .map(|(pid, process)| {
                let command = process
                    .exe()
                    .map(|exe| exe.display().to_string())
                    .unwrap_or_else(|| process.name().to_string());
                let mem_percent = if total_memory > 0 {
                    process.memory() as f64 * 100.0 / total_memory as f64
                } else {
                    0.0
                };
                let started_at = match process.start_time() {
                    0 => None,
                    secs => Some(secs as i64 * 1000),
                };
                ProcessInfo {
                    pid: pid.as_u32(),
                    name: process.name().to_string(),
                    command,
                    args: process.cmd().iter().skip(1).cloned().collect(),
                    started_at,
                    cpu_percent: Some(process.cpu_usage() as f64),
                    mem_percent: Some(mem_percent),
                }
            })
            .collect();
        Ok(list)
    }

    async fn current_metric(&self, category: MetricCategory) -> Result<RawReading, ProviderError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        match category {
            MetricCategory::Cpu => Self::cpu_load(&mut state),
            MetricCategory::Memory => Ok(Self::memory(&mut state)),
            MetricCategory::Network => Ok(Self::network(&mut state, now)),
            MetricCategory::Disk => Ok(Self::disk_io(&mut state, now)),
            MetricCategory::DiskSize => Self::disk_capacity(&mut state),
        }
    }
}
