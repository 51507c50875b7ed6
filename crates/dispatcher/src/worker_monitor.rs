use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use distjet_config::RegistryConfig;
use distjet_domain::WorkerId;

use crate::registry::WorkerRegistry;
use crate::scheduler::SchedulerHandle;

/// 单次检测的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// 心跳超时被移除的worker
    pub lost: Vec<WorkerId>,
    /// 空闲超时被要求结束的worker
    pub idle: Vec<WorkerId>,
}

impl MonitorReport {
    pub fn is_empty(&self) -> bool {
        self.lost.is_empty() && self.idle.is_empty()
    }
}

/// Worker失效检测
///
/// 周期性检查注册表：心跳超时的worker被移除，其在途任务交给调度器回收；
/// 空闲超时的worker被要求执行应用结束过程。
pub struct WorkerMonitor {
    registry: Arc<WorkerRegistry>,
    scheduler: SchedulerHandle,
    interval: Duration,
}

impl WorkerMonitor {
    pub fn new(registry: Arc<WorkerRegistry>, scheduler: SchedulerHandle, interval: Duration) -> Self {
        Self {
            registry,
            scheduler,
            interval,
        }
    }

    pub fn from_config(
        registry: Arc<WorkerRegistry>,
        scheduler: SchedulerHandle,
        config: &RegistryConfig,
    ) -> Self {
        Self::new(registry, scheduler, config.monitor_interval())
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "启动Worker失效检测循环");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("收到停止信号，退出Worker失效检测循环");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.detect_at(Utc::now()).await;
                    if !report.is_empty() {
                        info!(lost = ?report.lost, idle = ?report.idle, "Worker检测完成");
                    }
                }
            }
        }
    }

    /// 以给定时间执行一次检测
    pub async fn detect_at(&self, now: DateTime<Utc>) -> MonitorReport {
        let mut report = MonitorReport::default();

        for wid in self.registry.list_lost_at(now).await {
            warn!(wid, "检测到失效Worker，心跳超时");
            match self.registry.remove_lost(wid).await {
                Ok(_) => {
                    if let Err(e) = self.scheduler.worker_removed(wid) {
                        error!(wid, "通知调度器回收任务失败: {}", e);
                    }
                    report.lost.push(wid);
                }
                Err(e) => debug!(wid, "worker已经被移除: {}", e),
            }
        }

        for wid in self.registry.list_idle_timeout_at(now).await {
            match self.registry.finalize_if_idle(wid, now).await {
                Ok(true) => info!(wid, "worker空闲超时，请求结束"),
                Ok(false) => {
                    debug!(wid, "worker已经分配了新任务，不再结束");
                    continue;
                }
                Err(e) => {
                    debug!(wid, "标记worker结束失败: {}", e);
                    continue;
                }
            }
            if let Err(e) = self.scheduler.worker_finalize_request(wid) {
                error!(wid, "通知调度器结束worker失败: {}", e);
            }
            report.idle.push(wid);
        }

        report
    }
}
