use metrics::counter;
use tracing::{debug, info, warn};

use distjet_domain::{TaskId, WorkerId};

/// 调度过程的日志/指标出口
///
/// 所有方法都有空的默认实现，调用方只需要覆盖关心的事件。
pub trait SchedulerObserver: Send + Sync {
    fn task_dispatched(&self, _app_id: u64, _tid: TaskId, _wid: WorkerId) {}

    fn dispatch_failed(&self, _app_id: u64, _tid: TaskId, _wid: WorkerId, _reason: &str) {}

    fn task_completed(&self, _app_id: u64, _tid: TaskId, _wid: WorkerId) {}

    /// `retry`为true时任务会重新排队，否则永久失败
    fn task_failed(&self, _app_id: u64, _tid: TaskId, _wid: WorkerId, _retry: bool) {}

    fn tasks_reclaimed(&self, _wid: WorkerId, _tids: &[TaskId]) {}

    fn consistency_warning(&self, _message: &str) {}

    fn app_completed(&self, _app_id: u64, _total: usize) {}
}

/// 不做任何事情的观察者
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SchedulerObserver for NoopObserver {}

/// 通过tracing输出日志，同时记录metrics计数器
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SchedulerObserver for TracingObserver {
    fn task_dispatched(&self, app_id: u64, tid: TaskId, wid: WorkerId) {
        debug!(app_id, tid, wid, "任务已分发");
        counter!("distjet_tasks_dispatched_total").increment(1);
    }

    fn dispatch_failed(&self, app_id: u64, tid: TaskId, wid: WorkerId, reason: &str) {
        warn!(app_id, tid, wid, "任务分发失败，重新放回队首: {}", reason);
        counter!("distjet_dispatch_failures_total").increment(1);
    }

    fn task_completed(&self, app_id: u64, tid: TaskId, wid: WorkerId) {
        info!(app_id, tid, wid, "任务完成");
        counter!("distjet_tasks_completed_total").increment(1);
    }

    fn task_failed(&self, app_id: u64, tid: TaskId, wid: WorkerId, retry: bool) {
        if retry {
            info!(app_id, tid, wid, "任务失败，等待重新分配");
            counter!("distjet_task_retries_total").increment(1);
        } else {
            warn!(app_id, tid, wid, "任务失败，重试次数已用完");
            counter!("distjet_tasks_failed_total").increment(1);
        }
    }

    fn tasks_reclaimed(&self, wid: WorkerId, tids: &[TaskId]) {
        info!(wid, ?tids, "回收worker上未完成的任务");
        counter!("distjet_tasks_reclaimed_total").increment(tids.len() as u64);
    }

    fn consistency_warning(&self, message: &str) {
        warn!("状态不一致: {}", message);
        counter!("distjet_consistency_warnings_total").increment(1);
    }

    fn app_completed(&self, app_id: u64, total: usize) {
        info!(app_id, total, "应用执行完成");
        counter!("distjet_apps_completed_total").increment(1);
    }
}
