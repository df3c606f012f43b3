use anyhow::Result;
use predicates::prelude::*;
use std::net::TcpListener;
use assert_cmd::Command;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

fn jobwatch_bin() -> Result<Command> {
    let mut cmd = Command::cargo_bin("jobwatch")?;
    cmd.env_remove("GITHUB_STEP_SUMMARY").env_remove("RUST_LOG");
    Ok(cmd)
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_help_lists_public_subcommands() -> Result<()> {
    jobwatch_bin()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("finish"))
        .stdout(predicate::str::contains("resolved-config").not());
    Ok(())
}

#[test]
fn test_finish_without_start_is_silent_success() -> Result<()> {
    let dir = tempdir()?;
    jobwatch_bin()?
        .arg("finish")
        .arg("--state-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("never started"));
    Ok(())
}

#[test]
fn test_bad_config_falls_back_to_defaults() -> Result<()> {
    let dir = tempdir()?;
    let config = dir.path().join("jobwatch.toml");
    std::fs::write(&config, "[sampling]\nfrequency_ms = \"never\"\n")?;

    jobwatch_bin()?
        .arg("finish")
        .arg("--config")
        .arg(&config)
        .arg("--state-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("using defaults"));
    Ok(())
}

#[test]
fn test_start_then_finish_publishes_summary() -> Result<()> {
    let dir = tempdir()?;
    let summary = dir.path().join("summary.md");
    let port = free_port().to_string();

    jobwatch_bin()?
        .env("JOBWATCH_CONTROL__PORT", &port)
        .arg("start")
        .arg("--state-dir")
        .arg(dir.path())
        .arg("--frequency-ms")
        .arg("100")
        .timeout(Duration::from_secs(20))
        .assert()
        .success();
    assert!(dir.path().join("sampler.json").exists());

    sleep(Duration::from_millis(500));

    jobwatch_bin()?
        .env("JOBWATCH_CONTROL__PORT", &port)
        .env(
            "JOBWATCH_REPORT__CHART_SERVICE_URL",
            "http://127.0.0.1:1/chart/create",
        )
        .arg("finish")
        .arg("--state-dir")
        .arg(dir.path())
        .arg("--job-summary")
        .arg(&summary)
        .timeout(Duration::from_secs(60))
        .assert()
        .success();

    let written = std::fs::read_to_string(&summary)?;
    assert!(written.starts_with("## Job Telemetry"));
    assert!(!dir.path().join("sampler.json").exists());
    assert!(dir.path().join("processes.json").exists());
    assert!(dir.path().join("metrics.json").exists());
    Ok(())
}
