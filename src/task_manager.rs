//! Named tasks of the background sampler process, joined on shutdown.
use anyhow::Result;
use futures::future::join_all;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Spawns the sampler's long-lived tasks and waits for all of them.
///
/// Every task shares one stop signal. A task that returns an error or panics
/// is logged by name; the others are still awaited.
#[derive(Debug)]
pub struct TaskManager {
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
    stop_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(stop_rx: watch::Receiver<bool>) -> Self {
        Self {
            tasks: Vec::new(),
            stop_rx,
        }
    }

    /// Spawns `future` under `name`.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        debug!(task = name, "Spawning task");
        self.tasks.push((name, tokio::spawn(future)));
    }

    /// A receiver for the shared stop signal.
    pub fn stop_rx(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every task and returns how many of them failed.
    pub async fn join(self) -> usize {
        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        info!(tasks = ?names, "Waiting for tasks to finish");

        let mut failed = 0;
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(Ok(())) => debug!(task = name, "Task finished."),
                Ok(Err(e)) => {
                    failed += 1;
                    error!(task = name, error = %e, "Task failed");
                }
                Err(e) => {
                    failed += 1;
                    error!(task = name, error = %e, "Task panicked");
                }
            }
        }
        if failed == 0 {
            info!("All tasks finished.");
        }
        failed
    }
}
