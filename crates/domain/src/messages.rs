//! master与worker之间的消息定义
//!
//! 消息标识分两段：小于100的标识留给传输层控制消息（心跳、注册、断开），
//! 大于等于100的标识用于应用层消息（任务、应用初始化/结束、注销）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use distjet_errors::{SchedulerError, SchedulerResult};

use crate::application::Procedure;
use crate::task::Task;
use crate::{TaskId, WorkerId};

/// 消息标识
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageTag {
    Ping = 6,
    Register = 11,
    RegisterAck = 12,
    Disconnect = 13,

    WorkerStop = 100,
    WorkerInfo = 101,
    TaskFinished = 110,
    TaskSync = 111,
    TaskAdd = 112,
    TaskRemove = 113,
    AppInit = 120,
    AppInitAsk = 121,
    AppFinalize = 122,
    Logout = 130,
    LogoutAck = 131,
}

impl MessageTag {
    pub const APPLICATION_BASE: u16 = 100;

    pub fn code(self) -> u16 {
        self as u16
    }

    /// 传输层控制消息
    pub fn is_control(self) -> bool {
        self.code() < Self::APPLICATION_BASE
    }

    pub fn from_code(code: u16) -> Option<Self> {
        let tag = match code {
            6 => MessageTag::Ping,
            11 => MessageTag::Register,
            12 => MessageTag::RegisterAck,
            13 => MessageTag::Disconnect,
            100 => MessageTag::WorkerStop,
            101 => MessageTag::WorkerInfo,
            110 => MessageTag::TaskFinished,
            111 => MessageTag::TaskSync,
            112 => MessageTag::TaskAdd,
            113 => MessageTag::TaskRemove,
            120 => MessageTag::AppInit,
            121 => MessageTag::AppInitAsk,
            122 => MessageTag::AppFinalize,
            130 => MessageTag::Logout,
            131 => MessageTag::LogoutAck,
            _ => return None,
        };
        Some(tag)
    }
}

/// 应用初始化/结束消息的内容，未声明过程时全部为空字符串
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcedurePayload {
    pub app_id: u64,
    pub boot: String,
    pub data: String,
    pub resource_dir: String,
}

impl ProcedurePayload {
    pub fn empty(app_id: u64) -> Self {
        Self {
            app_id,
            ..Self::default()
        }
    }

    pub fn from_procedure(app_id: u64, procedure: Option<&Procedure>) -> Self {
        match procedure {
            Some(p) => Self {
                app_id,
                boot: p.boot.clone(),
                data: p.data.clone(),
                resource_dir: p.resource_dir.clone(),
            },
            None => Self::empty(app_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.boot.is_empty() && self.data.is_empty() && self.resource_dir.is_empty()
    }
}

/// 分配给worker的任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskAssignment {
    pub app_id: u64,
    pub tid: TaskId,
    pub boot: String,
    pub data: String,
    pub resource_dir: String,
}

impl TaskAssignment {
    pub fn from_task(app_id: u64, task: &Task, resource_dir: &str) -> Self {
        Self {
            app_id,
            tid: task.tid,
            boot: task.boot.clone(),
            data: task.data.clone(),
            resource_dir: resource_dir.to_string(),
        }
    }
}

/// master -> worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MasterMessage {
    RegisterAck { wid: WorkerId },
    WorkerStop,
    TaskAdd(TaskAssignment),
    TaskRemove { tid: TaskId },
    TaskSync,
    AppInit(ProcedurePayload),
    AppFinalize(ProcedurePayload),
    LogoutAck,
}

impl MasterMessage {
    pub fn tag(&self) -> MessageTag {
        match self {
            MasterMessage::RegisterAck { .. } => MessageTag::RegisterAck,
            MasterMessage::WorkerStop => MessageTag::WorkerStop,
            MasterMessage::TaskAdd(_) => MessageTag::TaskAdd,
            MasterMessage::TaskRemove { .. } => MessageTag::TaskRemove,
            MasterMessage::TaskSync => MessageTag::TaskSync,
            MasterMessage::AppInit(_) => MessageTag::AppInit,
            MasterMessage::AppFinalize(_) => MessageTag::AppFinalize,
            MasterMessage::LogoutAck => MessageTag::LogoutAck,
        }
    }
}

/// worker -> master
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    Ping { uuid: String },
    Register { uuid: String, max_capacity: u32 },
    Disconnect { uuid: String },
    WorkerInfo { wid: WorkerId, max_capacity: u32 },
    TaskFinished {
        wid: WorkerId,
        /// 任务所属的应用，用于识别切换应用后迟到的结果
        app_id: u64,
        tid: TaskId,
        success: bool,
        start_time: DateTime<Utc>,
        finish_time: DateTime<Utc>,
    },
    TaskSync { wid: WorkerId, running: Vec<TaskId> },
    AppInitDone { wid: WorkerId, output: String },
    AppInitAsk { wid: WorkerId },
    AppFinalizeAsk { wid: WorkerId },
    AppFinalizeDone { wid: WorkerId, output: String },
    Logout { wid: WorkerId },
}

impl WorkerMessage {
    /// 创建注册消息，uuid不能为空
    pub fn register(uuid: impl Into<String>, max_capacity: u32) -> SchedulerResult<Self> {
        let uuid = uuid.into();
        if uuid.trim().is_empty() {
            return Err(SchedulerError::invalid_message("注册消息的uuid不能为空"));
        }
        Ok(WorkerMessage::Register { uuid, max_capacity })
    }

    pub fn ping(uuid: impl Into<String>) -> SchedulerResult<Self> {
        let uuid = uuid.into();
        if uuid.trim().is_empty() {
            return Err(SchedulerError::invalid_message("心跳消息的uuid不能为空"));
        }
        Ok(WorkerMessage::Ping { uuid })
    }

    /// 创建任务结束消息，结束时间不能早于开始时间
    pub fn task_finished(
        wid: WorkerId,
        app_id: u64,
        tid: TaskId,
        success: bool,
        start_time: DateTime<Utc>,
        finish_time: DateTime<Utc>,
    ) -> SchedulerResult<Self> {
        if finish_time < start_time {
            return Err(SchedulerError::invalid_message(format!(
                "任务 {tid} 的结束时间早于开始时间"
            )));
        }
        Ok(WorkerMessage::TaskFinished {
            wid,
            app_id,
            tid,
            success,
            start_time,
            finish_time,
        })
    }

    pub fn tag(&self) -> MessageTag {
        match self {
            WorkerMessage::Ping { .. } => MessageTag::Ping,
            WorkerMessage::Register { .. } => MessageTag::Register,
            WorkerMessage::Disconnect { .. } => MessageTag::Disconnect,
            WorkerMessage::WorkerInfo { .. } => MessageTag::WorkerInfo,
            WorkerMessage::TaskFinished { .. } => MessageTag::TaskFinished,
            WorkerMessage::TaskSync { .. } => MessageTag::TaskSync,
            WorkerMessage::AppInitDone { .. } | WorkerMessage::AppInitAsk { .. } => {
                MessageTag::AppInit
            }
            WorkerMessage::AppFinalizeAsk { .. } | WorkerMessage::AppFinalizeDone { .. } => {
                MessageTag::AppFinalize
            }
            WorkerMessage::Logout { .. } => MessageTag::Logout,
        }
    }

    /// 消息携带的wid；控制消息只携带uuid
    pub fn wid(&self) -> Option<WorkerId> {
        match self {
            WorkerMessage::Ping { .. }
            | WorkerMessage::Register { .. }
            | WorkerMessage::Disconnect { .. } => None,
            WorkerMessage::WorkerInfo { wid, .. }
            | WorkerMessage::TaskFinished { wid, .. }
            | WorkerMessage::TaskSync { wid, .. }
            | WorkerMessage::AppInitDone { wid, .. }
            | WorkerMessage::AppInitAsk { wid }
            | WorkerMessage::AppFinalizeAsk { wid }
            | WorkerMessage::AppFinalizeDone { wid, .. }
            | WorkerMessage::Logout { wid } => Some(*wid),
        }
    }
}

/// 消息信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: String,
    /// 发送方的uuid
    pub sender: String,
    pub tag: MessageTag,
    pub body: T,
    pub timestamp: DateTime<Utc>,
}

impl Envelope<MasterMessage> {
    pub fn from_master(sender: impl Into<String>, body: MasterMessage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            tag: body.tag(),
            body,
            timestamp: Utc::now(),
        }
    }
}

impl Envelope<WorkerMessage> {
    pub fn from_worker(sender: impl Into<String>, body: WorkerMessage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            tag: body.tag(),
            body,
            timestamp: Utc::now(),
        }
    }
}

impl<T> Envelope<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    pub fn serialize(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(json: &str) -> SchedulerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn serialize_bytes(&self) -> SchedulerResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> SchedulerResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
