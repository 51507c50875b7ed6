//! 进程内模拟worker，通过[`distjet_dispatcher::ChannelTransport`]与master通信

pub mod agent;

pub use agent::{default_uuid, AgentReport, WorkerAgent, WorkerAgentConfig};
