use std::io::Write;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use distjet::app::MasterApp;
use distjet::shutdown::ShutdownManager;
use distjet_config::AppConfig;
use distjet_dispatcher::SchedulerExit;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_cluster_from_config_file() {
    let file = write_config(
        r#"
[policy]
redo_if_failed = true
redo_limit = 2

[scheduler]
idle_wait_ms = 10
dispatch_timeout_ms = 500

[local]
workers = 3
worker_capacity = 2
failure_rate = 0.0
task_duration_ms = 5
heartbeat_interval_ms = 50

[[local.applications]]
name = "first"
task_count = 5
init_boot = "setup.sh"

[[local.applications]]
name = "second"
task_count = 4
"#,
    );

    let config = AppConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.policy.redo_limit(), 2);
    assert_eq!(config.local.applications.len(), 2);

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        MasterApp::new(config).run(CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(summary.exit, SchedulerExit::Exhausted);
    assert_eq!(summary.finished_tasks, 9);
    assert_eq!(summary.workers.len(), 3);
    assert!(summary.workers.iter().all(|w| w.wid.is_some()));
}

#[tokio::test]
async fn test_shutdown_stops_running_cluster() {
    let mut config = AppConfig::default();
    config.local.workers = 1;
    config.local.worker_capacity = 1;
    config.local.failure_rate = 0.0;
    config.local.task_duration_ms = 50;
    config.local.heartbeat_interval_ms = 50;
    config.local.applications[0].task_count = 1000;
    config.scheduler.idle_wait_ms = 10;

    let app = MasterApp::new(config);
    let shutdown = ShutdownManager::new();
    let handle = tokio::spawn(app.run(shutdown.subscribe()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.shutdown();

    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.exit, SchedulerExit::Cancelled);
    assert!(summary.finished_tasks < 1000);
    assert_eq!(summary.workers.len(), 1);
    assert!(summary.workers[0].wid.is_some());
}

#[test]
fn test_missing_config_file_is_an_error() {
    assert!(AppConfig::load(Some("/nonexistent/distjet.toml")).is_err());
}
