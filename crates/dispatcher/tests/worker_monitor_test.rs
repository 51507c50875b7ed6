use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use distjet_config::{Policy, RegistryConfig, SchedulerConfig};
use distjet_dispatcher::{MonitorReport, Scheduler, WorkerMonitor, WorkerRegistry};
use distjet_domain::WorkerStatus;
use distjet_testing_utils::{
    registered_ready_worker, ApplicationBuilder, MockApplicationManager, MockTransport, TestEnv,
};

fn setup(registry: Arc<WorkerRegistry>, transport: &MockTransport, tasks: u64) -> Scheduler {
    Scheduler::new(
        registry,
        Arc::new(transport.clone()),
        Arc::new(MockApplicationManager::new(vec![ApplicationBuilder::new(1)
            .with_tasks(tasks)
            .build()])),
        Policy::default(),
        SchedulerConfig::default(),
    )
}

#[tokio::test]
async fn test_lost_worker_tasks_are_reclaimed() {
    let registry = Arc::new(WorkerRegistry::new(
        Duration::from_secs(10),
        Duration::from_secs(100),
    ));
    let transport = MockTransport::new();
    let mut scheduler = setup(registry.clone(), &transport, 3);
    let worker = registered_ready_worker(&registry, "w-1", 2).await;
    let monitor = WorkerMonitor::new(registry.clone(), scheduler.handle(), Duration::from_secs(1));

    scheduler.load_current_app().await;
    scheduler.step().await;
    assert_eq!(scheduler.snapshot().in_flight_of(worker.wid), &[1, 2]);

    assert!(monitor.detect_at(Utc::now()).await.is_empty());

    let later = Utc::now() + chrono::Duration::seconds(11);
    let report = monitor.detect_at(later).await;
    assert_eq!(
        report,
        MonitorReport {
            lost: vec![worker.wid],
            idle: Vec::new(),
        }
    );
    let audit = registry.all_workers().await;
    assert_eq!(audit[0].status, WorkerStatus::Lost);

    scheduler.step().await;
    assert_eq!(scheduler.snapshot().pending, vec![1, 2, 3]);
    assert_eq!(registry.all_workers().await[0].assigned, 0);

    assert!(monitor.detect_at(later).await.is_empty());
}

#[tokio::test]
async fn test_idle_worker_is_asked_to_finalize() {
    let registry = Arc::new(WorkerRegistry::new(
        Duration::from_secs(1000),
        Duration::from_secs(5),
    ));
    let transport = MockTransport::new();
    let mut scheduler = setup(registry.clone(), &transport, 0);
    let idle = registered_ready_worker(&registry, "w-idle", 1).await;
    let busy = registered_ready_worker(&registry, "w-busy", 1).await;
    registry.assign(busy.wid).await.unwrap();
    let monitor = WorkerMonitor::new(registry.clone(), scheduler.handle(), Duration::from_secs(1));

    let later = Utc::now() + chrono::Duration::seconds(6);
    let report = monitor.detect_at(later).await;
    assert_eq!(report.idle, vec![idle.wid]);
    assert!(report.lost.is_empty());
    assert_eq!(
        registry.get(idle.wid).await.unwrap().status,
        WorkerStatus::Complete
    );

    scheduler.load_current_app().await;
    scheduler.on_worker_finalize_request(idle.wid).await;
    assert_eq!(transport.finalize_payloads_to("w-idle").len(), 1);

    assert!(monitor.detect_at(later).await.idle.is_empty());
}

#[tokio::test]
async fn test_monitor_loop_stops_on_cancel() {
    let config = RegistryConfig {
        lost_worker_timeout_seconds: 1,
        idle_worker_timeout_seconds: 100,
        monitor_interval_ms: 20,
    };
    let registry = Arc::new(WorkerRegistry::from_config(&config));
    let transport = MockTransport::new();
    let scheduler = setup(registry.clone(), &transport, 1);
    let monitor = WorkerMonitor::from_config(registry.clone(), scheduler.handle(), &config);
    registry.register("w-1", 1).await.unwrap();

    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let task = tokio::spawn(async move { monitor.run(loop_cancel).await });

    let removed = TestEnv::wait_for(
        || {
            let registry = registry.clone();
            async move { registry.alive_count().await == 0 }
        },
        Duration::from_secs(3),
    )
    .await;
    assert!(removed);

    cancel.cancel();
    task.await.unwrap();
}
