use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker注册表配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// 超过该时间没有收到worker的任何消息即判定为丢失
    pub lost_worker_timeout_seconds: u64,
    /// 空闲超过该时间的worker会被要求结束
    pub idle_worker_timeout_seconds: u64,
    /// worker检测间隔（毫秒）
    pub monitor_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lost_worker_timeout_seconds: 10,
            idle_worker_timeout_seconds: 100,
            monitor_interval_ms: 1000,
        }
    }
}

impl RegistryConfig {
    pub fn lost_worker_timeout(&self) -> Duration {
        Duration::from_secs(self.lost_worker_timeout_seconds)
    }

    pub fn idle_worker_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_worker_timeout_seconds)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lost_worker_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Worker丢失超时时间必须大于0"));
        }
        if self.idle_worker_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Worker空闲超时时间必须大于0"));
        }
        if self.monitor_interval_ms == 0 {
            return Err(anyhow::anyhow!("Worker检测间隔必须大于0"));
        }
        Ok(())
    }
}

/// 调度循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 一轮循环没有任何进展时的等待时间（毫秒）
    pub idle_wait_ms: u64,
    /// 单次分发的超时时间（毫秒）
    pub dispatch_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 100,
            dispatch_timeout_ms: 2000,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.idle_wait_ms == 0 {
            return Err(anyhow::anyhow!("空闲等待时间必须大于0"));
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(anyhow::anyhow!("分发超时时间必须大于0"));
        }
        Ok(())
    }
}

/// 本地模拟集群中的一个应用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAppConfig {
    pub name: String,
    pub task_count: u64,
    #[serde(default)]
    pub init_boot: Option<String>,
    #[serde(default)]
    pub resource_dir: Option<String>,
}

/// 本地模拟集群配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalClusterConfig {
    pub workers: usize,
    pub worker_capacity: u32,
    /// 模拟任务失败的概率（0.0-1.0）
    pub failure_rate: f64,
    pub task_duration_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub applications: Vec<LocalAppConfig>,
}

impl Default for LocalClusterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            worker_capacity: 2,
            failure_rate: 0.1,
            task_duration_ms: 200,
            heartbeat_interval_ms: 1000,
            applications: vec![LocalAppConfig {
                name: "demo".to_string(),
                task_count: 20,
                init_boot: None,
                resource_dir: None,
            }],
        }
    }
}

impl LocalClusterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            return Err(anyhow::anyhow!("模拟worker数量必须大于0"));
        }
        if self.worker_capacity == 0 {
            return Err(anyhow::anyhow!("worker容量必须大于0"));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(anyhow::anyhow!(
                "失败概率必须在0.0到1.0之间: {}",
                self.failure_rate
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        if self.applications.iter().any(|app| app.name.is_empty()) {
            return Err(anyhow::anyhow!("应用名称不能为空"));
        }
        Ok(())
    }
}
