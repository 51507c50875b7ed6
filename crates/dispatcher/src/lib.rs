//! master端调度服务
//!
//! 注册表、调度循环、消息接收路径和worker失效检测，以及进程内传输层和
//! 应用管理器的默认实现。

pub mod app_manager;
pub mod master;
pub mod observer;
pub mod registry;
pub mod scheduler;
pub mod transport;
pub mod worker_monitor;

pub use app_manager::InMemoryApplicationManager;
pub use master::Master;
pub use observer::{NoopObserver, SchedulerObserver, TracingObserver};
pub use registry::WorkerRegistry;
pub use scheduler::{Scheduler, SchedulerExit, SchedulerHandle, SchedulerSnapshot, StepOutcome};
pub use transport::{ChannelTransport, WorkerLink, WorkerSender, DEFAULT_OUTBOX_CAPACITY};
pub use worker_monitor::{MonitorReport, WorkerMonitor};
