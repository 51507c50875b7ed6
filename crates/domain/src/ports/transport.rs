use async_trait::async_trait;
use distjet_errors::SchedulerResult;

use crate::application::Application;
use crate::messages::{MasterMessage, ProcedurePayload, TaskAssignment};
use crate::task::Task;
use crate::worker::WorkerEntry;

/// 传输层接口：按worker的uuid点对点投递消息
///
/// 发送必须是非阻塞的或者有超时限制，失败时返回`SchedulerError::Transport`。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, uuid: &str, message: MasterMessage) -> SchedulerResult<()>;

    /// 向worker分发任务，任务使用应用的资源目录
    async fn dispatch(
        &self,
        worker: &WorkerEntry,
        app: &Application,
        task: &Task,
    ) -> SchedulerResult<()> {
        let assignment = TaskAssignment::from_task(app.app_id, task, &app.resource_dir);
        self.send(&worker.uuid, MasterMessage::TaskAdd(assignment))
            .await
    }

    async fn send_init(
        &self,
        worker: &WorkerEntry,
        payload: ProcedurePayload,
    ) -> SchedulerResult<()> {
        self.send(&worker.uuid, MasterMessage::AppInit(payload)).await
    }

    async fn send_finalize(
        &self,
        worker: &WorkerEntry,
        payload: ProcedurePayload,
    ) -> SchedulerResult<()> {
        self.send(&worker.uuid, MasterMessage::AppFinalize(payload))
            .await
    }
}
