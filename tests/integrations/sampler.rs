use jobwatch::core::{MetricCategory, ProcessState};
use jobwatch::provider::fake::{process, ScriptedProvider};
use jobwatch::repository::StateRepository;
use jobwatch::sampler::{Sampler, SamplerOptions};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;

fn assert_exclusive(state: &ProcessState) {
    let tracked: HashSet<u32> = state.tracked.iter().map(|p| p.pid).collect();
    let mut seen = HashSet::new();
    for done in &state.completed {
        assert!(seen.insert(done.pid), "pid {} completed twice", done.pid);
        assert!(!tracked.contains(&done.pid), "pid {} in both sets", done.pid);
        assert!(done.duration >= 0);
        assert_eq!(done.duration, done.end_time - done.start_time);
    }
}

#[tokio::test]
async fn test_ticks_walk_processes_through_their_lifecycle() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_snapshot(vec![process(1, "make", 10.0, 1.0)]);
    provider.push_snapshot(vec![process(1, "make", 80.0, 0.5), process(2, "cc", 40.0, 2.0)]);
    provider.push_snapshot(vec![process(2, "cc", 20.0, 3.0)]);
    provider.push_snapshot(vec![]);

    let repository = StateRepository::in_dir(dir.path());
    let mut sampler = Sampler::new(provider, repository.clone(), SamplerOptions::default());

    let mut stored = Vec::new();
    for now in [1_000, 6_000, 11_000, 16_000] {
        sampler.tick_at(now).await.unwrap();
        let state = repository.processes.load().await.unwrap();
        assert_exclusive(&state);
        stored.push(state);
    }

    // make: seen at 1s and 6s, gone at 11s.
    let make = &stored[2].completed[0];
    assert_eq!((make.pid, make.start_time, make.end_time), (1, 1_000, 11_000));
    assert_eq!(make.max_cpu, 80.0);
    assert_eq!(make.max_mem, 1.0);

    // cc: seen at 6s and 11s, gone at 16s.
    let cc = &stored[3].completed[1];
    assert_eq!((cc.pid, cc.start_time, cc.end_time), (2, 6_000, 16_000));
    assert_eq!(cc.max_cpu, 40.0);
    assert_eq!(cc.max_mem, 3.0);
    assert!(stored[3].tracked.is_empty());
}

#[tokio::test]
async fn test_metric_histories_are_ordered_and_scaled() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    let repository = StateRepository::in_dir(dir.path());
    let mut sampler = Sampler::new(provider.clone(), repository.clone(), SamplerOptions::default());

    sampler.tick_at(10_000).await.unwrap();
    provider.fail_metric(MetricCategory::Disk, true);
    sampler.tick_at(15_000).await.unwrap();
    provider.fail_metric(MetricCategory::Disk, false);
    sampler.tick_at(20_000).await.unwrap();

    let metrics = repository.metrics.load().await.unwrap();
    assert_eq!(metrics.cpu.len(), 3);
    assert_eq!(metrics.disk.len(), 2);
    assert!(metrics.cpu.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    // First tick has no interval; 2 MiB/s and 1 MiB/s over 5s afterwards.
    assert_eq!((metrics.network[0].rx_mb, metrics.network[0].tx_mb), (0, 0));
    assert_eq!((metrics.network[1].rx_mb, metrics.network[1].tx_mb), (10, 5));
    assert_eq!(metrics.disk[1].timestamp, 20_000);
    assert_eq!((metrics.disk[1].rx_mb, metrics.disk[1].wx_mb), (5, 20));
}

#[tokio::test]
async fn test_run_flushes_everything_before_returning() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_snapshot(vec![process(7, "cargo", 90.0, 10.0), process(8, "rustc", 50.0, 5.0)]);
    provider.push_snapshot(vec![process(7, "cargo", 95.0, 12.0)]);

    let repository = StateRepository::in_dir(dir.path());
    let mut sampler = Sampler::new(
        provider,
        repository.clone(),
        SamplerOptions {
            period: Duration::from_millis(25),
            ..SamplerOptions::default()
        },
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { sampler.run(stop_rx).await });
    tokio::time::sleep(Duration::from_millis(120)).await;
    stop_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let state = repository.processes.load().await.unwrap();
    assert_exclusive(&state);
    assert!(state.tracked.is_empty());
    let pids: HashSet<u32> = state.completed.iter().map(|p| p.pid).collect();
    assert_eq!(pids, HashSet::from([7, 8]));

    let metrics = repository.metrics.load().await.unwrap();
    assert!(metrics.cpu.len() >= 2);
    assert!(metrics.cpu.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_corrupt_documents_load_as_empty() {
    let dir = tempdir().unwrap();
    let repository = StateRepository::in_dir(dir.path());
    std::fs::write(repository.processes.path(), b"{\"tracked\": [").unwrap();
    std::fs::write(repository.metrics.path(), b"not json").unwrap();

    assert!(repository.processes.load().await.is_none());
    assert!(repository.metrics.load().await.is_none());
}

#[tokio::test]
async fn test_non_finite_reading_keeps_document_loadable() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_snapshot(vec![process(3, "node", f64::NAN, 2.0), process(4, "sh", 1.0, 1.0)]);
    provider.push_snapshot(vec![process(3, "node", 25.0, f64::NAN)]);

    let repository = StateRepository::in_dir(dir.path());
    let mut sampler = Sampler::new(provider, repository.clone(), SamplerOptions::default());
    sampler.tick_at(1_000).await.unwrap();
    sampler.tick_at(6_000).await.unwrap();

    let state = repository
        .processes
        .load()
        .await
        .expect("document survives a NaN reading");
    assert_exclusive(&state);
    assert_eq!(state.tracked.len(), 1);
    assert_eq!(state.tracked[0].peak_cpu_percent, 25.0);
    assert_eq!(state.tracked[0].peak_mem_percent, 2.0);
    assert_eq!(state.completed[0].pid, 4);
}
