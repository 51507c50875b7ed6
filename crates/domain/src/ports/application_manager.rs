use async_trait::async_trait;

use crate::application::Application;
use crate::TaskId;

/// 应用管理器接口，负责按顺序提供应用
#[async_trait]
pub trait ApplicationManager: Send + Sync {
    /// 当前应用；没有任何应用时返回None
    async fn current_app(&self) -> Option<Application>;

    /// 推进到下一个应用
    async fn next_app(&self) -> Option<Application>;

    /// 任务到达终态（成功或永久失败）后的通知
    async fn task_done(&self, app: &Application, tid: TaskId);
}
