//! 调度领域模型
//!
//! 任务、应用、worker记录、消息格式以及调度器依赖的外部端口。

pub mod application;
pub mod events;
pub mod messages;
pub mod ports;
pub mod task;
pub mod worker;

pub use application::{Application, Procedure};
pub use distjet_errors::{SchedulerError, SchedulerResult, TaskId, WorkerId};
pub use events::{TaskCompletedEvent, TaskFailedEvent, WorkerLifecycleEvent};
pub use messages::{
    Envelope, MasterMessage, MessageTag, ProcedurePayload, TaskAssignment, WorkerMessage,
};
pub use ports::{ApplicationManager, Transport};
pub use task::{AttemptOutcome, Task, TaskAttempt, TaskStatus};
pub use worker::{WorkerEntry, WorkerStatus};
