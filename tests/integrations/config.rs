use clap::Parser;
use jobwatch::cli::{Cli, Command, ConfigArgs};
use jobwatch::config::{Config, Theme};
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    test_fn(file.path().to_path_buf());
}

fn args_for(path: PathBuf) -> ConfigArgs {
    ConfigArgs {
        config: Some(path),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        state_dir = "/tmp/jobwatch-test"
        [sampling]
        frequency_ms = 1000
        [metrics]
        enabled = false
        [process_trace]
        min_duration_ms = 250
        include_system = true
        chart_max_count = 20
        table_show = true
        [control]
        port = 9123
        finish_timeout_ms = 5000
        [report]
        title = "Build telemetry"
        theme = "dark"
        chart_service_url = "http://charts.local/chart/create"
        steps_file = "/tmp/steps.json"
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&args_for(path)).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/jobwatch-test"));
        assert_eq!(config.sampling.frequency_ms, 1000);
        assert!(!config.metrics.enabled);
        assert!(config.process_trace.enabled);
        assert_eq!(config.process_trace.min_duration_ms, 250);
        assert!(config.process_trace.include_system);
        assert_eq!(config.process_trace.chart_max_count, 20);
        assert!(config.process_trace.chart_show);
        assert!(config.process_trace.table_show);
        assert_eq!(config.control.port, 9123);
        assert_eq!(config.control.finish_timeout_ms, 5000);
        assert_eq!(config.report.title, "Build telemetry");
        assert_eq!(config.report.theme, Theme::Dark);
        assert_eq!(
            config.report.chart_service_url,
            "http://charts.local/chart/create"
        );
        assert_eq!(config.report.steps_file, Some(PathBuf::from("/tmp/steps.json")));
        assert_eq!(config.report.chart_width, 800);
    });
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let config = Config::load(&args_for(PathBuf::from("/nonexistent/jobwatch.toml"))).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
#[serial]
fn test_env_overrides_file() {
    with_config_file("[sampling]\nfrequency_ms = 1000\n", |path| {
        std::env::set_var("JOBWATCH_SAMPLING__FREQUENCY_MS", "2500");
        std::env::set_var("JOBWATCH_REPORT__THEME", "dark");
        let config = Config::load(&args_for(path));
        std::env::remove_var("JOBWATCH_SAMPLING__FREQUENCY_MS");
        std::env::remove_var("JOBWATCH_REPORT__THEME");

        let config = config.unwrap();
        assert_eq!(config.sampling.frequency_ms, 2500);
        assert_eq!(config.report.theme, Theme::Dark);
    });
}

#[test]
#[serial]
fn test_cli_overrides_env_and_file() {
    with_config_file("[process_trace]\nchart_max_count = 50\n", |path| {
        std::env::set_var("JOBWATCH_PROCESS_TRACE__MIN_DURATION_MS", "500");
        let cli = Cli::try_parse_from([
            "jobwatch",
            "finish",
            "--config",
            path.to_str().unwrap(),
            "--chart-max-count",
            "5",
            "--min-duration-ms",
            "-1",
            "--table-show",
            "true",
        ])
        .unwrap();
        let config = Config::load(&cli.args);
        std::env::remove_var("JOBWATCH_PROCESS_TRACE__MIN_DURATION_MS");

        assert_eq!(cli.command, Command::Finish { no_report: false });
        let config = config.unwrap();
        assert_eq!(config.process_trace.chart_max_count, 5);
        assert_eq!(config.process_trace.min_duration_ms, -1);
        assert!(config.process_trace.table_show);
    });
}

#[test]
#[serial]
fn test_unparseable_file_is_an_error() {
    with_config_file("[sampling]\nfrequency_ms = \"often\"\n", |path| {
        assert!(Config::load(&args_for(path)).is_err());
    });
}

#[test]
#[serial]
fn test_sanitized_repairs_out_of_range_values() {
    with_config_file(
        "[sampling]\nfrequency_ms = 0\n[process_trace]\nchart_max_count = 0\nmin_duration_ms = -7\n",
        |path| {
            let config = Config::load(&args_for(path)).unwrap().sanitized();
            assert_eq!(config.sampling.frequency_ms, 5000);
            assert_eq!(config.process_trace.chart_max_count, 100);
            assert_eq!(config.process_trace.min_duration_ms, -1);
        },
    );
}
