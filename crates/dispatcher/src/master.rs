use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use distjet_domain::{
    Envelope, MasterMessage, TaskCompletedEvent, TaskFailedEvent, Transport, WorkerId,
    WorkerMessage,
};
use distjet_errors::SchedulerResult;

use crate::registry::WorkerRegistry;
use crate::scheduler::SchedulerHandle;

/// master端的消息接收路径
///
/// 负责更新注册表（注册、心跳、初始化确认），并把任务结果和worker生命周期
/// 事件转交给调度器。调度器的运行状态不会在这里被直接修改。
pub struct Master {
    registry: Arc<WorkerRegistry>,
    transport: Arc<dyn Transport>,
    scheduler: SchedulerHandle,
}

impl Master {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        transport: Arc<dyn Transport>,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            registry,
            transport,
            scheduler,
        }
    }

    /// 接收循环，收件箱关闭或收到取消信号时退出
    pub async fn run(
        &self,
        mut inbound: mpsc::UnboundedReceiver<Envelope<WorkerMessage>>,
        cancel: CancellationToken,
    ) {
        info!("master接收循环启动");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("收到停止信号，master接收循环退出");
                    break;
                }
                envelope = inbound.recv() => {
                    let Some(envelope) = envelope else {
                        info!("收件箱已关闭，master接收循环退出");
                        break;
                    };
                    let sender = envelope.sender.clone();
                    let tag = envelope.tag;
                    if let Err(e) = self.handle_message(envelope).await {
                        if e.is_not_found() || e.is_consistency_warning() {
                            warn!(sender = %sender, ?tag, "忽略消息: {}", e);
                        } else {
                            error!(sender = %sender, ?tag, "处理消息失败: {}", e);
                        }
                    }
                }
            }
        }
    }

    pub async fn handle_message(&self, envelope: Envelope<WorkerMessage>) -> SchedulerResult<()> {
        let sender = envelope.sender;
        debug!(sender = %sender, tag = envelope.tag.code(), "收到worker消息");

        match envelope.body {
            WorkerMessage::Register { uuid, max_capacity } => {
                self.on_register(&uuid, max_capacity).await
            }
            WorkerMessage::Ping { uuid } => {
                self.registry.touch_by_uuid(&uuid).await?;
                Ok(())
            }
            WorkerMessage::Disconnect { uuid } => {
                let worker = self.registry.get_by_uuid(&uuid).await?;
                info!(wid = worker.wid, uuid = %uuid, "worker断开连接");
                self.retire(worker.wid).await
            }
            WorkerMessage::WorkerInfo { wid, max_capacity } => {
                debug!(wid, max_capacity, "收到worker信息");
                self.registry.touch(wid).await
            }
            WorkerMessage::TaskFinished {
                wid,
                app_id,
                tid,
                success,
                start_time,
                finish_time,
            } => {
                self.touch_quietly(wid).await;
                if success {
                    self.scheduler.task_completed(TaskCompletedEvent {
                        wid,
                        app_id,
                        tid,
                        start_time,
                        finish_time,
                    })
                } else {
                    self.scheduler.task_failed(TaskFailedEvent { wid, app_id, tid })
                }
            }
            WorkerMessage::TaskSync { wid, running } => {
                debug!(wid, ?running, "worker同步运行中的任务");
                self.registry.touch(wid).await
            }
            WorkerMessage::AppInitDone { wid, output } => {
                self.registry.touch(wid).await?;
                self.registry.mark_initialized(wid, Some(output)).await?;
                self.scheduler.wake();
                Ok(())
            }
            WorkerMessage::AppInitAsk { wid } => {
                self.registry.touch(wid).await?;
                self.scheduler.worker_initialize(wid)
            }
            WorkerMessage::AppFinalizeAsk { wid } => {
                self.registry.touch(wid).await?;
                self.registry.mark_finalizing(wid).await?;
                self.scheduler.worker_finalize_request(wid)
            }
            WorkerMessage::AppFinalizeDone { wid, output } => {
                let worker = self.registry.get(wid).await?;
                self.registry.set_fin_output(wid, output).await?;
                self.retire(wid).await?;
                info!(wid, "worker结束完成，发送停止消息");
                self.transport
                    .send(&worker.uuid, MasterMessage::WorkerStop)
                    .await
            }
            WorkerMessage::Logout { wid } => {
                let worker = self.registry.get(wid).await?;
                info!(wid, uuid = %worker.uuid, "worker注销");
                self.retire(wid).await?;
                self.transport.send(&worker.uuid, MasterMessage::LogoutAck).await
            }
        }
    }

    async fn on_register(&self, uuid: &str, max_capacity: u32) -> SchedulerResult<()> {
        let worker = self.registry.register(uuid, max_capacity).await?;
        self.transport
            .send(uuid, MasterMessage::RegisterAck { wid: worker.wid })
            .await?;
        self.scheduler.worker_initialize(worker.wid)
    }

    /// 从注册表移除并通知调度器回收在途任务
    async fn retire(&self, wid: WorkerId) -> SchedulerResult<()> {
        self.registry.remove(wid).await?;
        self.scheduler.worker_removed(wid)
    }

    async fn touch_quietly(&self, wid: WorkerId) {
        if let Err(e) = self.registry.touch(wid).await {
            debug!(wid, "更新心跳时间失败: {}", e);
        }
    }
}
