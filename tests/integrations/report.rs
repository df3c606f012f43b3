use jobwatch::config::Config;
use jobwatch::core::{Collected, CompletedProcess, CpuStats, MemoryStats, MetricHistograms, ProcessState};
use jobwatch::report::chart_client::QuickChartClient;
use jobwatch::report::{self, JobStep, ReportBuilder, StepStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completed(pid: u32, name: &str, start_time: i64, duration: i64) -> CompletedProcess {
    CompletedProcess {
        pid,
        name: name.to_string(),
        command: format!("/usr/bin/{name}"),
        args: vec!["--release".to_string()],
        start_time,
        end_time: start_time + duration,
        duration,
        max_cpu: 50.0,
        max_mem: 5.0,
    }
}

fn collected() -> Collected {
    Collected {
        processes: ProcessState {
            tracked: vec![],
            completed: vec![
                completed(1, "p100", 10, 100),
                completed(2, "p500", 20, 500),
                completed(3, "p300", 30, 300),
                completed(4, "p700", 40, 700),
                completed(5, "p200", 50, 200),
            ],
        },
        metrics: MetricHistograms {
            cpu: vec![
                CpuStats {
                    timestamp: 0,
                    user_load: 20.0,
                    system_load: 5.0,
                },
                CpuStats {
                    timestamp: 5_000,
                    user_load: 60.0,
                    system_load: 10.0,
                },
            ],
            memory: vec![MemoryStats {
                timestamp: 0,
                total_mb: 4096.0,
                active_mb: 1024.0,
                available_mb: 3072.0,
            }],
            ..Default::default()
        },
    }
}

async fn chart_service() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chart/create"))
        .and(body_partial_json(json!({ "backgroundColor": "white" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "url": "https://charts.example/light.png" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chart/create"))
        .and(body_partial_json(json!({ "backgroundColor": "#0d1117" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "url": "https://charts.example/dark.png" })),
        )
        .mount(&server)
        .await;
    server
}

fn builder(config: &Config, server_uri: &str) -> ReportBuilder {
    let client =
        QuickChartClient::new(format!("{server_uri}/chart/create"), Duration::from_secs(5)).unwrap();
    ReportBuilder::new(config, Arc::new(client))
}

#[tokio::test]
async fn test_report_end_to_end() {
    let server = chart_service().await;
    let mut config = Config::default();
    config.process_trace.chart_max_count = 3;
    config.process_trace.table_show = true;

    let steps = vec![
        JobStep {
            name: "Set up job".to_string(),
            status: StepStatus::Success,
            started_at: Some(0),
            completed_at: Some(10),
        },
        JobStep {
            name: "Run: cargo test".to_string(),
            status: StepStatus::Failure,
            started_at: Some(10),
            completed_at: Some(800),
        },
    ];

    let markdown = builder(&config, &server.uri()).build(&collected(), &steps).await;

    // Both themes rendered for both metric charts.
    assert_eq!(markdown.matches("<picture>").count(), 2);
    assert!(markdown.contains(
        "<source media=\"(prefers-color-scheme: dark)\" srcset=\"https://charts.example/dark.png\">"
    ));
    assert!(markdown.contains("src=\"https://charts.example/light.png\""));

    // Step separator escaped and failure marked.
    assert!(markdown.contains("  Run#colon; cargo test : crit, 10, 800\n"));

    // Top three by duration, drawn in start order.
    let gantt_start = markdown.find("title Processes").unwrap();
    let gantt = &markdown[gantt_start..];
    let gantt = &gantt[..gantt.find("```").unwrap()];
    let order: Vec<&str> = gantt
        .lines()
        .skip(3)
        .map(|line| line.trim().split(' ').next().unwrap())
        .collect();
    assert_eq!(order, vec!["p500", "p300", "p700"]);

    // The table lists every process that passed the filters.
    for name in ["p100", "p200", "p300", "p500", "p700"] {
        assert!(markdown.contains(&format!("/usr/bin/{name} --release")));
    }
}

#[tokio::test]
async fn test_unreachable_chart_service_omits_charts_only() {
    let mut config = Config::default();
    config.report.chart_timeout_ms = 500;

    let client =
        QuickChartClient::new("http://127.0.0.1:1/chart/create".to_string(), Duration::from_millis(500))
            .unwrap();
    let markdown = ReportBuilder::new(&config, Arc::new(client))
        .build(&collected(), &[])
        .await;

    assert!(!markdown.contains("### Metrics"));
    assert!(markdown.contains("### Processes"));
}

#[tokio::test]
async fn test_published_report_lands_in_job_summary() {
    let server = chart_service().await;
    let dir = tempdir().unwrap();
    let summary = dir.path().join("step_summary.md");

    let mut config = Config::default();
    config.process_trace.min_duration_ms = 250;
    config.report.job_summary_path = Some(summary.clone());

    let markdown = builder(&config, &server.uri()).build(&collected(), &[]).await;
    report::publish(&markdown, &config.report).await.unwrap();

    let written = std::fs::read_to_string(&summary).unwrap();
    assert!(written.starts_with("## Job Telemetry\n"));
    assert!(written.contains("p700"));
    assert!(!written.contains("p100"));
    assert!(!written.contains("p200"));
}
