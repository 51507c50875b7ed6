//! 调度事件
//!
//! 由传输层接收路径产生，经通道送入调度器的控制循环。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TaskId, WorkerId};

/// 任务成功完成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletedEvent {
    pub wid: WorkerId,
    pub app_id: u64,
    pub tid: TaskId,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
}

/// 任务执行失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailedEvent {
    pub wid: WorkerId,
    pub app_id: u64,
    pub tid: TaskId,
}

/// worker生命周期事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerLifecycleEvent {
    /// worker已注册，需要下发应用初始化内容
    Initialize { wid: WorkerId },
    /// worker请求结束当前应用
    FinalizeRequest { wid: WorkerId },
    /// worker已从注册表移除（丢失、注销或被回收）
    Removed { wid: WorkerId },
}

impl WorkerLifecycleEvent {
    pub fn wid(&self) -> WorkerId {
        match self {
            WorkerLifecycleEvent::Initialize { wid }
            | WorkerLifecycleEvent::FinalizeRequest { wid }
            | WorkerLifecycleEvent::Removed { wid } => *wid,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            WorkerLifecycleEvent::Initialize { .. } => "WorkerInitialize",
            WorkerLifecycleEvent::FinalizeRequest { .. } => "WorkerFinalizeRequest",
            WorkerLifecycleEvent::Removed { .. } => "WorkerRemoved",
        }
    }
}
