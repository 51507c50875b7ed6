use serde::{Deserialize, Serialize};

/// 任务失败后的重试策略，创建后不可修改
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Policy {
    redo_if_failed: bool,
    redo_limit: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            redo_if_failed: true,
            redo_limit: 3,
        }
    }
}

impl Policy {
    pub fn new(redo_if_failed: bool, redo_limit: u32) -> Self {
        Self {
            redo_if_failed,
            redo_limit,
        }
    }

    /// 失败后不再重试
    pub fn no_retry() -> Self {
        Self::new(false, 0)
    }

    pub fn redo_if_failed(&self) -> bool {
        self.redo_if_failed
    }

    pub fn redo_limit(&self) -> u32 {
        self.redo_limit
    }

    /// 根据本次失败之前的执行次数判断是否重试
    ///
    /// `previous_attempts`不包含本次失败，所以一个任务最多执行`redo_limit + 1`次。
    pub fn should_retry(&self, previous_attempts: usize) -> bool {
        self.redo_if_failed && previous_attempts < self.redo_limit as usize
    }
}
