//! The background sampling loop.
//!
//! A [`Sampler`] owns the mutable tracker and metric histories for one job.
//! Each tick diffs the process table, records metrics and rewrites both
//! documents. Stopping runs one last tick, completes every process still
//! tracked and saves again, so a reader that waits for [`Sampler::run`] to
//! return sees everything that was collected.

use crate::accumulator::MetricAccumulator;
use crate::config::Config;
use crate::core::{now_millis, Collected, HostProvider, Millis};
use crate::repository::StateRepository;
use crate::scheduler::{guarded, run_ticks, DriftScheduler};
use crate::tracker::ProcessTracker;
use anyhow::Result;
use futures::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// What a sampler collects on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerOptions {
    pub period: Duration,
    pub trace_processes: bool,
    pub collect_metrics: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(5000),
            trace_processes: true,
            collect_metrics: true,
        }
    }
}

impl SamplerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            period: Duration::from_millis(config.sampling.frequency_ms),
            trace_processes: config.process_trace.enabled,
            collect_metrics: config.metrics.enabled,
        }
    }
}

pub struct Sampler {
    provider: Arc<dyn HostProvider>,
    repository: StateRepository,
    tracker: ProcessTracker,
    accumulator: MetricAccumulator,
    options: SamplerOptions,
    ticks: u64,
}

impl Sampler {
    /// Creates a sampler with empty state.
    pub fn new(
        provider: Arc<dyn HostProvider>,
        repository: StateRepository,
        options: SamplerOptions,
    ) -> Self {
        Self {
            provider,
            repository,
            tracker: ProcessTracker::new(),
            accumulator: MetricAccumulator::new(),
            options,
            ticks: 0,
        }
    }

    pub fn tracker(&self) -> &ProcessTracker {
        &self.tracker
    }

    pub fn accumulator(&self) -> &MetricAccumulator {
        &self.accumulator
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one sampling tick at the current time.
    pub async fn tick(&mut self) -> Result<()> {
        self.tick_at(now_millis()).await
    }

    /// Runs one sampling tick as if the current time were `now`.
    pub async fn tick_at(&mut self, now: Millis) -> Result<()> {
        let started = Instant::now();
        self.ticks += 1;

        if self.options.trace_processes {
            match self.provider.current_process_list().await {
                Ok(snapshot) => {
                    let summary = self.tracker.observe(&snapshot, now);
                    debug!(
                        started = summary.started,
                        completed = summary.completed,
                        tracked = summary.tracked,
                        "Diffed process table"
                    );
                }
                Err(e) => warn!(error = %e, "Skipping process table for this tick"),
            }
        }
        if self.options.collect_metrics {
            self.accumulator.record(&*self.provider, now).await;
        }

        self.persist().await?;
        debug!(
            tick = self.ticks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tick complete"
        );
        Ok(())
    }

    /// Writes both documents.
    pub async fn persist(&self) -> Result<()> {
        let processes = self.repository.processes.save(&self.tracker.state()).await;
        let metrics = self
            .repository
            .metrics
            .save(self.accumulator.histograms())
            .await;
        processes?;
        metrics?;
        Ok(())
    }

    /// Final tick, forced completion of every tracked process, final save.
    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> Result<()> {
        guarded("final tick", self.tick()).await;
        let finalized = self.tracker.finalize(now_millis());
        info!(
            finalized,
            completed = self.tracker.completed().len(),
            "Sampler flushing final state"
        );
        self.persist().await
    }

    /// Ticks on a drift-corrected schedule until `shutdown_rx` flips, then flushes.
    ///
    /// A tick in progress when the signal arrives finishes first.
    #[instrument(skip(self, shutdown_rx), fields(period_ms = self.options.period.as_millis() as u64))]
    pub async fn run(&mut self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        info!("Sampler started.");
        let mut scheduler = DriftScheduler::new(self.options.period);
        run_ticks(&mut scheduler, shutdown_rx, &mut *self, |sampler| {
            sampler.tick().boxed()
        })
        .await;
        let result = self.flush().await;
        info!(ticks = self.ticks, "Sampler finished.");
        result
    }

    /// Consumes the sampler and returns its in-memory state.
    pub fn into_collected(self) -> Collected {
        Collected {
            processes: self.tracker.into_state(),
            metrics: self.accumulator.into_histograms(),
        }
    }
}
