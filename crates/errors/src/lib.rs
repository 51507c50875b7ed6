use thiserror::Error;

pub type WorkerId = u64;
pub type TaskId = u64;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("传输错误: {0}")]
    Transport(String),
    #[error("Worker重复注册: uuid={uuid}, 已存在wid={wid}")]
    DuplicateRegistration { uuid: String, wid: WorkerId },
    #[error("Worker未找到: {wid}")]
    WorkerNotFound { wid: WorkerId },
    #[error("Worker未找到: uuid={uuid}")]
    WorkerUuidNotFound { uuid: String },
    #[error("任务未找到: {tid}")]
    TaskNotFound { tid: TaskId },
    #[error("状态不一致: {0}")]
    Consistency(String),
    #[error("Worker容量已满: {wid}")]
    CapacityExceeded { wid: WorkerId },
    #[error("无效的消息: {0}")]
    InvalidMessage(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("通道已关闭: {0}")]
    ChannelClosed(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
    pub fn worker_not_found(wid: WorkerId) -> Self {
        Self::WorkerNotFound { wid }
    }
    pub fn worker_uuid_not_found<S: Into<String>>(uuid: S) -> Self {
        Self::WorkerUuidNotFound { uuid: uuid.into() }
    }
    pub fn task_not_found(tid: TaskId) -> Self {
        Self::TaskNotFound { tid }
    }
    pub fn consistency<S: Into<String>>(msg: S) -> Self {
        Self::Consistency(msg.into())
    }
    pub fn invalid_message<S: Into<String>>(msg: S) -> Self {
        Self::InvalidMessage(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 可重试的错误：发送失败的任务会被放回待调度队列
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Transport(_)
                | SchedulerError::CapacityExceeded { .. }
                | SchedulerError::ChannelClosed(_)
        )
    }
    /// 针对未知wid/tid的操作，调用方记录日志后忽略
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::WorkerNotFound { .. }
                | SchedulerError::WorkerUuidNotFound { .. }
                | SchedulerError::TaskNotFound { .. }
        )
    }
    pub fn is_consistency_warning(&self) -> bool {
        matches!(self, SchedulerError::Consistency(_))
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_) | SchedulerError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
