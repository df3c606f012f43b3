//! Drift-corrected tick scheduling.
//!
//! Tick `k` is scheduled at `origin + k * period`. A slow tick does not push
//! later ticks back; if a tick overruns the period the next one fires
//! immediately and the schedule catches up, with at most one tick owed.

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Yields tick deadlines anchored to a fixed schedule origin.
#[derive(Debug)]
pub struct DriftScheduler {
    period: Duration,
    expected: Option<Instant>,
}

impl DriftScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            expected: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// The scheduled time of the most recent tick, if any has fired.
    pub fn last_scheduled(&self) -> Option<Instant> {
        self.expected
    }

    /// Waits for the next scheduled tick.
    ///
    /// The first call fires immediately and fixes the schedule origin. Each
    /// later call advances the expected time by one period and sleeps until
    /// then, or not at all if that time has already passed.
    pub async fn next_tick(&mut self) -> Instant {
        let deadline = match self.expected {
            None => Instant::now(),
            Some(expected) => match expected.checked_add(self.period) {
                Some(deadline) => deadline,
                None => {
                    warn!(
                        period_ms = self.period.as_millis() as u64,
                        "Next tick lies beyond the clock's range; no further ticks"
                    );
                    return std::future::pending().await;
                }
            },
        };
        self.expected = Some(deadline);

        let now = Instant::now();
        if deadline > now {
            sleep_until(deadline).await;
        } else if now > deadline {
            debug!(
                behind_ms = (now - deadline).as_millis() as u64,
                "Tick overran its period; firing immediately"
            );
        }
        deadline
    }
}

/// Runs one unit of work, logging its error or panic instead of propagating it.
///
/// Returns `true` if the work completed successfully.
pub async fn guarded<F>(name: &str, work: F) -> bool
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(task = name, error = %e, "Tick failed; continuing");
            false
        }
        Err(_) => {
            error!(task = name, "Tick panicked; continuing");
            false
        }
    }
}

/// Drives `tick` over `state` on the scheduler until the shutdown signal flips.
///
/// Cancellation only interrupts the wait between ticks. A tick that has
/// started always runs to completion.
pub async fn run_ticks<S, F>(
    scheduler: &mut DriftScheduler,
    mut shutdown_rx: watch::Receiver<bool>,
    state: &mut S,
    mut tick: F,
) where
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<()>>,
{
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                info!("Scheduler received shutdown signal.");
                break;
            }
            _ = scheduler.next_tick() => {}
        }
        guarded("scheduled tick", tick(state)).await;
    }
}
