//! The three phases of a job: `start`, the detached background sampler and
//! `finish`.
//!
//! `start` spawns the background phase as a separate OS process and leaves a
//! marker file behind. `finish` uses the marker to tell "never started" from
//! "started but collected nothing", asks the sampler to stop and flush over
//! its control endpoint, and only then loads the documents.

use crate::config::Config;
use crate::control::{ControlClient, ControlServer};
use crate::core::{now_millis, Collected, HostProvider, Millis};
use crate::repository::{JsonRepository, RepositoryError, StateRepository};
use crate::sampler::{Sampler, SamplerOptions};
use crate::task_manager::TaskManager;
use crate::tracker::ProcessTracker;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::future::Future;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

pub const MARKER_FILE: &str = "sampler.json";
pub const SAMPLER_LOG_FILE: &str = "sampler.log";

/// How long `start` waits for the background sampler to answer on its port.
const STARTUP_WAIT: Duration = Duration::from_secs(5);
const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Written by `start` once the background sampler has been spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleMarker {
    pub pid: u32,
    pub port: u16,
    pub started_at: Millis,
}

impl LifecycleMarker {
    fn repository(state_dir: &Path) -> JsonRepository<LifecycleMarker> {
        JsonRepository::new(state_dir.join(MARKER_FILE))
    }

    /// Reads the marker from `state_dir`. `None` means sampling was never started.
    pub async fn read(state_dir: &Path) -> Option<Self> {
        Self::repository(state_dir).load().await
    }

    pub async fn write(&self, state_dir: &Path) -> Result<(), RepositoryError> {
        Self::repository(state_dir).save(self).await
    }

    pub async fn remove(state_dir: &Path) -> io::Result<()> {
        remove_if_exists(&state_dir.join(MARKER_FILE)).await
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Spawns the detached background sampler and records the lifecycle marker.
///
/// Documents left over from an earlier job in the same state directory are
/// removed first.
#[instrument(skip(config), fields(state_dir = %config.state_dir.display()))]
pub async fn start(config: &Config) -> Result<LifecycleMarker> {
    let state_dir = &config.state_dir;
    tokio::fs::create_dir_all(state_dir)
        .await
        .with_context(|| format!("failed to create {}", state_dir.display()))?;

    let repository = StateRepository::in_dir(state_dir);
    for stale in [repository.processes.path(), repository.metrics.path()] {
        remove_if_exists(stale)
            .await
            .with_context(|| format!("failed to remove {}", stale.display()))?;
    }

    let resolved = config.resolved_config_path();
    tokio::fs::write(&resolved, serde_json::to_vec_pretty(config)?)
        .await
        .with_context(|| format!("failed to write {}", resolved.display()))?;

    let pid = spawn_background(&resolved, &state_dir.join(SAMPLER_LOG_FILE))?;
    let marker = LifecycleMarker {
        pid,
        port: config.control.port,
        started_at: now_millis(),
    };
    marker.write(state_dir).await?;
    info!(pid, port = marker.port, "Background sampler spawned");

    let client = ControlClient::new(marker.port, STARTUP_POLL);
    let deadline = tokio::time::Instant::now() + STARTUP_WAIT;
    loop {
        if client.is_alive().await {
            debug!("Background sampler is answering");
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                wait_ms = STARTUP_WAIT.as_millis() as u64,
                "Background sampler did not answer yet; continuing"
            );
            break;
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
    Ok(marker)
}

/// Re-executes the current binary as `run --resolved-config <path>` in its
/// own process group, with output appended to `log_path`.
fn spawn_background(resolved: &Path, log_path: &Path) -> Result<u32> {
    let exe = std::env::current_exe().context("failed to locate current executable")?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let mut command = Command::new(exe);
    command
        .arg("run")
        .arg("--resolved-config")
        .arg(resolved)
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().context("failed to spawn background sampler")?;
    Ok(child.id())
}

/// Runs the sampler and its control endpoint until a client calls
/// `/finish` or `external_stop` resolves, then flushes once and returns.
#[instrument(skip_all, fields(state_dir = %config.state_dir.display()))]
pub async fn run_background<S>(
    config: Config,
    provider: Arc<dyn HostProvider>,
    listener: TcpListener,
    external_stop: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let (flushed_tx, flushed_rx) = watch::channel(false);

    let server = ControlServer::new(listener, stop_tx.clone(), flushed_rx);
    if let Ok(addr) = server.local_addr() {
        info!(%addr, "Control endpoint listening");
    }

    let mut tasks = TaskManager::new(stop_rx);
    tasks.spawn("control", async move {
        server.run().await;
        Ok(())
    });

    let mut stop_watch = tasks.stop_rx();
    tasks.spawn("signals", async move {
        tokio::select! {
            _ = external_stop => {
                info!("Termination signal received; stopping sampler.");
                stop_tx.send_replace(true);
            }
            _ = stop_watch.changed() => {}
        }
        Ok(())
    });

    let mut sampler = Sampler::new(
        provider,
        StateRepository::in_dir(&config.state_dir),
        SamplerOptions::from_config(&config),
    );
    let sampler_stop = tasks.stop_rx();
    tasks.spawn("sampler", async move {
        let result = sampler.run(sampler_stop).await;
        flushed_tx.send_replace(true);
        result
    });

    let failed = tasks.join().await;
    if failed > 0 {
        bail!("{failed} background task(s) failed");
    }
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Stops the background sampler, waits for its final flush and reads back
/// what it collected.
///
/// Returns `None` if sampling was never started. An unreachable sampler is
/// logged and the last saved documents are used instead. Processes that are
/// still tracked in those documents are completed at the current time.
#[instrument(skip(config), fields(state_dir = %config.state_dir.display()))]
pub async fn finish(config: &Config) -> Option<Collected> {
    let state_dir = &config.state_dir;
    let Some(marker) = LifecycleMarker::read(state_dir).await else {
        info!("Sampling was never started; nothing to finish.");
        return None;
    };

    let client = ControlClient::new(
        marker.port,
        Duration::from_millis(config.control.finish_timeout_ms),
    );
    match client.finish().await {
        Ok(()) => debug!(pid = marker.pid, "Background sampler flushed"),
        Err(e) => warn!(
            pid = marker.pid,
            error = %e,
            "Could not stop background sampler; using its last saved state"
        ),
    }

    let collected = load_collected(state_dir, now_millis()).await;
    if let Err(e) = LifecycleMarker::remove(state_dir).await {
        warn!(error = %e, "Failed to remove lifecycle marker");
    }
    Some(collected)
}

/// Loads both documents from `state_dir`, completing leftover tracked
/// processes at `now`.
pub async fn load_collected(state_dir: &Path, now: Millis) -> Collected {
    let repository = StateRepository::in_dir(state_dir);
    let processes = repository.processes.load().await.unwrap_or_default();
    let metrics = repository.metrics.load().await.unwrap_or_default();

    let mut tracker = ProcessTracker::from_state(processes);
    let leftover = tracker.finalize(now);
    if leftover > 0 {
        info!(leftover, "Completed processes the sampler left tracked");
    }
    info!(
        completed = tracker.completed().len(),
        "Loaded collected state"
    );
    Collected {
        processes: tracker.into_state(),
        metrics,
    }
}
