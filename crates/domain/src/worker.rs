use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::WorkerId;

/// Worker状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "INITIALIZED")]
    Initialized,
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "LOST")]
    Lost,
    #[serde(rename = "COMPLETE")]
    Complete,
}

impl WorkerStatus {
    /// 完成初始化并且可以接收任务
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Initialized | WorkerStatus::Idle | WorkerStatus::Running
        )
    }
}

/// Worker注册表中的一条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub wid: WorkerId,
    pub uuid: String,
    pub registration_time: DateTime<Utc>,
    pub last_contact_time: DateTime<Utc>,
    pub idle_since: Option<DateTime<Utc>>,
    pub max_capacity: u32,
    pub assigned: u32,
    pub status: WorkerStatus,
    pub alive: bool,
    pub init_output: Option<String>,
    pub fin_output: Option<String>,
}

impl WorkerEntry {
    pub fn new(wid: WorkerId, uuid: impl Into<String>, max_capacity: u32) -> Self {
        let now = Utc::now();
        Self {
            wid,
            uuid: uuid.into(),
            registration_time: now,
            last_contact_time: now,
            idle_since: None,
            max_capacity,
            assigned: 0,
            status: WorkerStatus::New,
            alive: true,
            init_output: None,
            fin_output: None,
        }
    }

    /// 剩余可分配的任务数
    pub fn spare_capacity(&self) -> u32 {
        self.max_capacity.saturating_sub(self.assigned)
    }

    pub fn is_available(&self) -> bool {
        self.alive && self.status.is_ready() && self.assigned < self.max_capacity
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_contact_time = now;
    }

    /// 检查心跳是否超时
    pub fn is_lost(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_contact_time > timeout
    }

    /// 空闲时间是否超过阈值；有任务在执行的worker永远不算空闲
    pub fn is_idle_timeout(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if self.assigned != 0 {
            return false;
        }
        match self.idle_since {
            Some(since) => now - since > timeout,
            None => false,
        }
    }

    pub fn mark_initialized(&mut self, init_output: Option<String>) {
        self.init_output = init_output;
        self.status = WorkerStatus::Initialized;
        if self.assigned == 0 {
            self.idle_since = Some(Utc::now());
        }
    }

    /// 分配一个任务；容量已满时返回false
    pub fn assign(&mut self) -> bool {
        if self.assigned >= self.max_capacity {
            return false;
        }
        self.assigned += 1;
        self.idle_since = None;
        self.status = WorkerStatus::Running;
        true
    }

    /// 释放一个任务；计数已经为0时返回false
    pub fn release(&mut self, now: DateTime<Utc>) -> bool {
        if self.assigned == 0 {
            return false;
        }
        self.assigned -= 1;
        if self.assigned == 0 {
            self.idle_since = Some(now);
            if self.status == WorkerStatus::Running {
                self.status = WorkerStatus::Idle;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worker_is_not_ready() {
        let worker = WorkerEntry::new(1, "w-1", 2);
        assert_eq!(worker.status, WorkerStatus::New);
        assert!(worker.alive);
        assert!(!worker.is_available());
        assert_eq!(worker.spare_capacity(), 2);
    }

    #[test]
    fn test_assign_and_release() {
        let mut worker = WorkerEntry::new(1, "w-1", 2);
        worker.mark_initialized(Some("ok".to_string()));
        assert!(worker.is_available());

        assert!(worker.assign());
        assert_eq!(worker.status, WorkerStatus::Running);
        assert!(worker.assign());
        assert!(!worker.assign());
        assert_eq!(worker.assigned, 2);
        assert!(!worker.is_available());

        let now = Utc::now();
        assert!(worker.release(now));
        assert!(worker.release(now));
        assert!(!worker.release(now));
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert_eq!(worker.idle_since, Some(now));
    }

    #[test]
    fn test_lost_and_idle_timeout() {
        let mut worker = WorkerEntry::new(1, "w-1", 1);
        let now = Utc::now();
        worker.last_contact_time = now - Duration::seconds(30);
        assert!(worker.is_lost(now, Duration::seconds(10)));
        assert!(!worker.is_lost(now, Duration::seconds(60)));

        worker.idle_since = Some(now - Duration::seconds(200));
        assert!(worker.is_idle_timeout(now, Duration::seconds(100)));

        worker.assigned = 1;
        assert!(!worker.is_idle_timeout(now, Duration::seconds(100)));
    }
}
