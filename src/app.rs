use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use distjet_config::{AppConfig, LocalClusterConfig};
use distjet_dispatcher::{
    ChannelTransport, InMemoryApplicationManager, Master, Scheduler, SchedulerExit,
    TracingObserver, WorkerMonitor, WorkerRegistry, DEFAULT_OUTBOX_CAPACITY,
};
use distjet_domain::{Application, Procedure, Task};
use distjet_worker::{AgentReport, WorkerAgent, WorkerAgentConfig};

/// 一次运行的统计
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub exit: SchedulerExit,
    pub finished_tasks: usize,
    pub workers: Vec<AgentReport>,
}

/// master进程：注册表、调度器、消息接收路径、worker检测，以及本地模拟worker
pub struct MasterApp {
    config: AppConfig,
    registry: Arc<WorkerRegistry>,
    transport: Arc<ChannelTransport>,
    apps: Arc<InMemoryApplicationManager>,
}

impl MasterApp {
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(WorkerRegistry::from_config(&config.registry));
        let transport = Arc::new(ChannelTransport::new("master", DEFAULT_OUTBOX_CAPACITY));
        let apps = Arc::new(InMemoryApplicationManager::new(build_applications(
            &config.local,
        )));

        Self {
            config,
            registry,
            transport,
            apps,
        }
    }

    /// 运行直到所有应用执行完毕或者收到关闭信号
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunSummary> {
        let mut scheduler = Scheduler::new(
            self.registry.clone(),
            self.transport.clone(),
            self.apps.clone(),
            self.config.policy,
            self.config.scheduler.clone(),
        )
        .with_observer(Arc::new(TracingObserver));

        // 调度器退出后由它停止其余组件
        let services = shutdown.child_token();

        let inbound = self
            .transport
            .take_inbound()
            .await
            .context("master收件箱已被占用")?;
        let master = Master::new(
            self.registry.clone(),
            self.transport.clone(),
            scheduler.handle(),
        );
        let master_cancel = services.clone();
        let master_task = tokio::spawn(async move { master.run(inbound, master_cancel).await });

        let monitor =
            WorkerMonitor::from_config(self.registry.clone(), scheduler.handle(), &self.config.registry);
        let monitor_cancel = services.clone();
        let monitor_task = tokio::spawn(async move { monitor.run(monitor_cancel).await });

        let agents: Vec<_> = (0..self.config.local.workers)
            .map(|index| {
                let config = WorkerAgentConfig::from_cluster(&self.config.local, index);
                info!(uuid = %config.uuid, "启动本地worker");
                let agent = WorkerAgent::new(config, self.transport.clone());
                tokio::spawn(agent.run(services.clone()))
            })
            .collect();

        let exit = scheduler.run(shutdown.clone()).await?;
        info!(?exit, "调度器已退出，停止其余组件");
        services.cancel();

        let mut workers = Vec::new();
        for result in join_all(agents).await {
            match result {
                Ok(Ok(report)) => workers.push(report),
                Ok(Err(e)) => warn!("worker异常退出: {}", e),
                Err(e) => error!("worker任务执行失败: {}", e),
            }
        }
        master_task.await.context("master接收循环执行失败")?;
        monitor_task.await.context("worker检测循环执行失败")?;

        let finished_tasks = self.apps.finished_tasks().await.len();
        Ok(RunSummary {
            exit,
            finished_tasks,
            workers,
        })
    }
}

/// 根据本地集群配置生成应用
pub fn build_applications(local: &LocalClusterConfig) -> Vec<Application> {
    local
        .applications
        .iter()
        .enumerate()
        .map(|(index, local_app)| {
            let resource_dir = local_app.resource_dir.clone().unwrap_or_default();
            let tasks = (1..=local_app.task_count)
                .map(|tid| Task::new(tid).with_payload("task.sh", format!("{}-{tid}", local_app.name)));
            let mut app = Application::new(index as u64 + 1, local_app.name.clone())
                .with_tasks(tasks)
                .with_resource_dir(resource_dir.clone());
            if let Some(boot) = &local_app.init_boot {
                app = app.with_init(Procedure::new(boot.clone(), "", resource_dir));
            }
            app
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use distjet_config::LocalAppConfig;

    #[test]
    fn test_build_applications() {
        let local = LocalClusterConfig {
            applications: vec![
                LocalAppConfig {
                    name: "alpha".to_string(),
                    task_count: 3,
                    init_boot: Some("init.sh".to_string()),
                    resource_dir: Some("/opt/alpha".to_string()),
                },
                LocalAppConfig {
                    name: "beta".to_string(),
                    task_count: 0,
                    init_boot: None,
                    resource_dir: None,
                },
            ],
            ..LocalClusterConfig::default()
        };

        let apps = build_applications(&local);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].app_id, 1);
        assert_eq!(apps[0].task_ids(), vec![1, 2, 3]);
        assert_eq!(apps[0].get_task(2).unwrap().data, "alpha-2");
        assert_eq!(apps[0].init_payload().boot, "init.sh");
        assert_eq!(apps[0].resource_dir, "/opt/alpha");
        assert_eq!(apps[1].app_id, 2);
        assert!(apps[1].init_payload().is_empty());
    }

    #[tokio::test]
    async fn test_local_cluster_runs_to_completion() {
        let mut config = AppConfig::default();
        config.local.workers = 2;
        config.local.failure_rate = 0.0;
        config.local.task_duration_ms = 5;
        config.local.heartbeat_interval_ms = 50;
        config.local.applications[0].task_count = 8;
        config.scheduler.idle_wait_ms = 10;

        let summary = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            MasterApp::new(config).run(CancellationToken::new()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(summary.exit, SchedulerExit::Exhausted);
        assert_eq!(summary.finished_tasks, 8);
        assert_eq!(summary.workers.len(), 2);
        let succeeded: usize = summary.workers.iter().map(|w| w.succeeded).sum();
        assert_eq!(succeeded, 8);
    }
}
