use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TaskId, WorkerId};

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// 单次执行结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// 任务的一次执行记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskAttempt {
    pub wid: Option<WorkerId>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// 任务：应用中的最小调度单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub tid: TaskId,
    pub status: TaskStatus,
    pub history: Vec<TaskAttempt>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    /// 任务启动脚本，原样转发给worker
    pub boot: String,
    /// 任务数据，原样转发给worker
    pub data: String,
}

impl Task {
    pub fn new(tid: TaskId) -> Self {
        Self {
            tid,
            status: TaskStatus::Pending,
            history: Vec::new(),
            start_time: None,
            finish_time: None,
            boot: String::new(),
            data: String::new(),
        }
    }

    pub fn with_payload(mut self, boot: impl Into<String>, data: impl Into<String>) -> Self {
        self.boot = boot.into();
        self.data = data.into();
        self
    }

    /// 已经执行过的次数（成功和失败都计入）
    pub fn attempts(&self) -> usize {
        self.history.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_processing(&mut self) {
        self.status = TaskStatus::Processing;
    }

    pub fn reset_pending(&mut self) {
        self.status = TaskStatus::Pending;
    }

    pub fn complete(
        &mut self,
        start_time: DateTime<Utc>,
        finish_time: DateTime<Utc>,
        wid: Option<WorkerId>,
    ) {
        self.history.push(TaskAttempt {
            wid,
            start_time: Some(start_time),
            end_time: finish_time,
            outcome: AttemptOutcome::Succeeded,
        });
        self.start_time = Some(start_time);
        self.finish_time = Some(finish_time);
        self.status = TaskStatus::Completed;
    }

    /// 记录一次失败的执行，状态由调用方根据重试策略决定
    pub fn record_failure(&mut self, wid: Option<WorkerId>) {
        let now = Utc::now();
        self.history.push(TaskAttempt {
            wid,
            start_time: None,
            end_time: now,
            outcome: AttemptOutcome::Failed,
        });
    }

    pub fn mark_failed(&mut self) {
        self.finish_time = self.history.last().map(|attempt| attempt.end_time);
        self.status = TaskStatus::Failed;
    }

    pub fn failed_attempts(&self) -> usize {
        self.history
            .iter()
            .filter(|attempt| attempt.outcome == AttemptOutcome::Failed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new(1).with_payload("run.sh", "input-1");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts(), 0);
        assert_eq!(task.boot, "run.sh");
        assert_eq!(task.data, "input-1");
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_complete_records_attempt() {
        let mut task = Task::new(1);
        let start = Utc::now() - Duration::seconds(5);
        let finish = Utc::now();

        task.mark_processing();
        assert_eq!(task.status, TaskStatus::Processing);

        task.complete(start, finish, Some(2));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.attempts(), 1);
        assert_eq!(task.start_time, Some(start));
        assert_eq!(task.finish_time, Some(finish));
        assert_eq!(task.history[0].outcome, AttemptOutcome::Succeeded);
        assert_eq!(task.history[0].wid, Some(2));
        assert!(task.is_terminal());
    }

    #[test]
    fn test_failure_then_terminal() {
        let mut task = Task::new(3);
        task.record_failure(Some(1));
        task.reset_pending();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.failed_attempts(), 1);

        task.record_failure(Some(1));
        task.mark_failed();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts(), 2);
        assert!(task.finish_time.is_some());
        assert!(task.is_terminal());
    }
}
