use jobwatch::config::Config;
use jobwatch::core::{now_millis, ProcessState, TrackedProcess};
use jobwatch::lifecycle::{self, LifecycleMarker};
use jobwatch::provider::fake::{process, ScriptedProvider};
use jobwatch::repository::StateRepository;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn config_for(dir: &Path, port: u16) -> Config {
    let mut config = Config::default();
    config.state_dir = dir.to_path_buf();
    config.sampling.frequency_ms = 30;
    config.control.port = port;
    config.control.finish_timeout_ms = 5_000;
    config
}

async fn write_marker(dir: &Path, port: u16) {
    LifecycleMarker {
        pid: std::process::id(),
        port,
        started_at: now_millis(),
    }
    .write(dir)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_finish_reads_state_flushed_by_background_sampler() {
    let dir = tempdir().unwrap();
    let (listener, port) = bind().await;
    let config = config_for(dir.path(), port);
    write_marker(dir.path(), port).await;

    let provider = Arc::new(ScriptedProvider::new());
    provider.push_snapshot(vec![process(11, "cargo", 70.0, 4.0), process(12, "rustc", 30.0, 2.0)]);
    provider.push_snapshot(vec![process(11, "cargo", 90.0, 6.0)]);

    let background = tokio::spawn(lifecycle::run_background(
        config.clone(),
        provider,
        listener,
        std::future::pending(),
    ));
    tokio::time::sleep(Duration::from_millis(150)).await;

    let collected = lifecycle::finish(&config).await.expect("sampler was started");

    // The sampler's own forced finalization already completed cargo before
    // /finish answered, so nothing is left tracked in what was loaded.
    assert!(collected.processes.tracked.is_empty());
    let mut pids: Vec<u32> = collected.processes.completed.iter().map(|p| p.pid).collect();
    pids.sort_unstable();
    assert_eq!(pids, vec![11, 12]);
    let cargo = collected
        .processes
        .completed
        .iter()
        .find(|p| p.pid == 11)
        .unwrap();
    assert_eq!(cargo.max_cpu, 90.0);
    assert!(!collected.metrics.cpu.is_empty());

    // The marker is consumed and the background phase exits on its own.
    assert!(LifecycleMarker::read(dir.path()).await.is_none());
    tokio::time::timeout(Duration::from_secs(5), background)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_finish_never_started() {
    let dir = tempdir().unwrap();
    let config = config_for(dir.path(), 1);
    assert!(lifecycle::finish(&config).await.is_none());
}

#[tokio::test]
async fn test_finish_with_dead_sampler_uses_last_saved_state() {
    let dir = tempdir().unwrap();
    let (listener, port) = bind().await;
    drop(listener);
    let config = config_for(dir.path(), port);
    write_marker(dir.path(), port).await;

    let start_time = now_millis() - 60_000;
    StateRepository::in_dir(dir.path())
        .processes
        .save(&ProcessState {
            tracked: vec![TrackedProcess {
                pid: 99,
                name: "sleep".to_string(),
                command: "/bin/sleep".to_string(),
                args: vec!["600".to_string()],
                start_time,
                peak_cpu_percent: 0.1,
                peak_mem_percent: 0.2,
            }],
            completed: vec![],
        })
        .await
        .unwrap();

    let before = now_millis();
    let collected = lifecycle::finish(&config).await.unwrap();

    assert!(collected.processes.tracked.is_empty());
    let sleep = &collected.processes.completed[0];
    assert_eq!(sleep.start_time, start_time);
    assert!(sleep.end_time >= before);
    assert!(sleep.duration >= 60_000);
    assert!(collected.metrics.is_empty());
}

#[tokio::test]
async fn test_background_stops_on_termination_signal() {
    let dir = tempdir().unwrap();
    let (listener, port) = bind().await;
    let config = config_for(dir.path(), port);

    let provider = Arc::new(ScriptedProvider::new());
    provider.push_snapshot(vec![process(5, "npm", 12.0, 3.0)]);

    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let background = tokio::spawn(lifecycle::run_background(
        config,
        provider,
        listener,
        async move {
            let _ = signal_rx.await;
        },
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;
    signal_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), background)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let state = StateRepository::in_dir(dir.path())
        .processes
        .load()
        .await
        .unwrap();
    assert!(state.tracked.is_empty());
    assert_eq!(state.completed.len(), 1);
    assert_eq!(state.completed[0].name, "npm");
}
