use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use distjet_config::LocalClusterConfig;
use distjet_dispatcher::ChannelTransport;
use distjet_domain::{MasterMessage, TaskAssignment, TaskId, WorkerId, WorkerMessage};
use distjet_errors::SchedulerResult;

/// 模拟worker配置
#[derive(Debug, Clone)]
pub struct WorkerAgentConfig {
    pub uuid: String,
    pub capacity: u32,
    pub task_duration: Duration,
    /// 任务失败的概率（0.0-1.0）
    pub failure_rate: f64,
    pub heartbeat_interval: Duration,
}

impl WorkerAgentConfig {
    pub fn new(uuid: impl Into<String>, capacity: u32) -> Self {
        Self {
            uuid: uuid.into(),
            capacity,
            task_duration: Duration::from_millis(200),
            failure_rate: 0.0,
            heartbeat_interval: Duration::from_secs(1),
        }
    }

    pub fn task_duration(mut self, task_duration: Duration) -> Self {
        self.task_duration = task_duration;
        self
    }

    pub fn failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    pub fn heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// 本地集群中第`index`个worker的配置
    pub fn from_cluster(config: &LocalClusterConfig, index: usize) -> Self {
        Self::new(default_uuid(index), config.worker_capacity)
            .task_duration(Duration::from_millis(config.task_duration_ms))
            .failure_rate(config.failure_rate)
            .heartbeat_interval(Duration::from_millis(config.heartbeat_interval_ms))
    }
}

/// 以主机名为前缀生成worker的uuid
pub fn default_uuid(index: usize) -> String {
    let host = hostname::get()
        .unwrap_or_else(|_| "unknown".into())
        .to_string_lossy()
        .to_string();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{host}-worker-{index}-{}", &suffix[..8])
}

/// worker退出时的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReport {
    pub wid: Option<WorkerId>,
    pub succeeded: usize,
    pub failed: usize,
    /// 由master发送WorkerStop结束
    pub stopped_by_master: bool,
}

struct Execution {
    app_id: u64,
    tid: TaskId,
    success: bool,
    start_time: chrono::DateTime<Utc>,
    finish_time: chrono::DateTime<Utc>,
}

/// 进程内模拟的worker
///
/// 注册后等待初始化消息并回复确认，收到任务后模拟执行并上报结果，
/// 同时定期发送心跳。收到WorkerStop或LogoutAck时退出。
pub struct WorkerAgent {
    config: WorkerAgentConfig,
    transport: Arc<ChannelTransport>,
}

impl WorkerAgent {
    pub fn new(config: WorkerAgentConfig, transport: Arc<ChannelTransport>) -> Self {
        Self { config, transport }
    }

    pub fn uuid(&self) -> &str {
        &self.config.uuid
    }

    pub async fn run(self, cancel: CancellationToken) -> SchedulerResult<AgentReport> {
        let uuid = self.config.uuid.clone();
        let (sender, mut outbox) = self.transport.connect(uuid.clone()).await.split();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Execution>();

        sender.send(WorkerMessage::register(uuid.clone(), self.config.capacity)?)?;
        info!(uuid = %uuid, capacity = self.config.capacity, "worker已启动，等待注册确认");

        let mut report = AgentReport::default();
        let mut running: BTreeSet<TaskId> = BTreeSet::new();
        let mut heartbeat = interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Some(wid) = report.wid {
                        info!(wid, "收到停止信号，worker注销");
                        if let Err(e) = sender.send(WorkerMessage::Logout { wid }) {
                            debug!(wid, "发送注销消息失败: {}", e);
                        }
                    }
                    break;
                }
                _ = heartbeat.tick() => {
                    if report.wid.is_some() {
                        sender.send(WorkerMessage::ping(uuid.clone())?)?;
                    }
                }
                Some(execution) = done_rx.recv() => {
                    running.remove(&execution.tid);
                    if execution.success {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                    if let Some(wid) = report.wid {
                        sender.send(WorkerMessage::task_finished(
                            wid,
                            execution.app_id,
                            execution.tid,
                            execution.success,
                            execution.start_time,
                            execution.finish_time,
                        )?)?;
                    }
                }
                envelope = outbox.recv() => {
                    let Some(envelope) = envelope else {
                        warn!(uuid = %uuid, "master连接已关闭");
                        break;
                    };
                    match envelope.body {
                        MasterMessage::RegisterAck { wid } => {
                            info!(wid, uuid = %uuid, "注册成功");
                            report.wid = Some(wid);
                        }
                        MasterMessage::AppInit(payload) => {
                            let Some(wid) = report.wid else {
                                warn!(uuid = %uuid, "尚未注册，忽略初始化消息");
                                continue;
                            };
                            debug!(wid, app_id = payload.app_id, boot = %payload.boot, "执行应用初始化");
                            sender.send(WorkerMessage::AppInitDone {
                                wid,
                                output: format!("app {} initialized", payload.app_id),
                            })?;
                        }
                        MasterMessage::TaskAdd(assignment) => {
                            running.insert(assignment.tid);
                            self.execute(assignment, done_tx.clone());
                        }
                        MasterMessage::TaskRemove { tid } => {
                            debug!(tid, "master撤销任务，等待当前执行结束");
                        }
                        MasterMessage::TaskSync => {
                            if let Some(wid) = report.wid {
                                sender.send(WorkerMessage::TaskSync {
                                    wid,
                                    running: running.iter().copied().collect(),
                                })?;
                            }
                        }
                        MasterMessage::AppFinalize(payload) => {
                            if let Some(wid) = report.wid {
                                debug!(wid, app_id = payload.app_id, "执行应用结束过程");
                                sender.send(WorkerMessage::AppFinalizeDone {
                                    wid,
                                    output: format!("app {} finalized", payload.app_id),
                                })?;
                            }
                        }
                        MasterMessage::WorkerStop => {
                            info!(wid = ?report.wid, "收到停止消息，worker退出");
                            report.stopped_by_master = true;
                            break;
                        }
                        MasterMessage::LogoutAck => {
                            info!(wid = ?report.wid, "注销完成，worker退出");
                            break;
                        }
                    }
                }
            }
        }

        self.transport.disconnect(&uuid).await;
        Ok(report)
    }

    fn execute(&self, assignment: TaskAssignment, done_tx: mpsc::UnboundedSender<Execution>) {
        let duration = self.config.task_duration;
        let failure_rate = self.config.failure_rate;
        tokio::spawn(async move {
            let start_time = Utc::now();
            tokio::time::sleep(duration).await;
            let success = rand::random::<f64>() >= failure_rate;
            let _ = done_tx.send(Execution {
                app_id: assignment.app_id,
                tid: assignment.tid,
                success,
                start_time,
                finish_time: Utc::now(),
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_cluster() {
        let cluster = LocalClusterConfig {
            worker_capacity: 3,
            failure_rate: 2.0,
            task_duration_ms: 5,
            heartbeat_interval_ms: 50,
            ..LocalClusterConfig::default()
        };
        let config = WorkerAgentConfig::from_cluster(&cluster, 7);
        assert_eq!(config.capacity, 3);
        assert_eq!(config.failure_rate, 1.0);
        assert_eq!(config.task_duration, Duration::from_millis(5));
        assert!(config.uuid.contains("-worker-7-"));
    }

    #[test]
    fn test_default_uuid_is_unique() {
        assert_ne!(default_uuid(0), default_uuid(0));
    }
}
