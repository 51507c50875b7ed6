use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use distjet_config::{Policy, SchedulerConfig};
use distjet_domain::{
    Application, ApplicationManager, ProcedurePayload, TaskCompletedEvent, TaskFailedEvent,
    TaskId, Transport, WorkerEntry, WorkerId, WorkerLifecycleEvent,
};
use distjet_errors::{SchedulerError, SchedulerResult};

use crate::observer::{SchedulerObserver, TracingObserver};
use crate::registry::WorkerRegistry;

/// 调度器对外的事件入口
///
/// 传输层接收路径和worker监控只能通过这个句柄影响调度器的运行状态。
/// 每次投递事件都会唤醒处于空闲等待中的调度循环。
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    completed_tx: mpsc::UnboundedSender<TaskCompletedEvent>,
    failed_tx: mpsc::UnboundedSender<TaskFailedEvent>,
    lifecycle_tx: mpsc::UnboundedSender<WorkerLifecycleEvent>,
    notify: Arc<Notify>,
}

impl SchedulerHandle {
    pub fn task_completed(&self, event: TaskCompletedEvent) -> SchedulerResult<()> {
        self.completed_tx
            .send(event)
            .map_err(|_| SchedulerError::ChannelClosed("任务完成通道已关闭".to_string()))?;
        self.wake();
        Ok(())
    }

    pub fn task_failed(&self, event: TaskFailedEvent) -> SchedulerResult<()> {
        self.failed_tx
            .send(event)
            .map_err(|_| SchedulerError::ChannelClosed("任务失败通道已关闭".to_string()))?;
        self.wake();
        Ok(())
    }

    pub fn worker_event(&self, event: WorkerLifecycleEvent) -> SchedulerResult<()> {
        self.lifecycle_tx
            .send(event)
            .map_err(|_| SchedulerError::ChannelClosed("worker事件通道已关闭".to_string()))?;
        self.wake();
        Ok(())
    }

    pub fn worker_initialize(&self, wid: WorkerId) -> SchedulerResult<()> {
        self.worker_event(WorkerLifecycleEvent::Initialize { wid })
    }

    pub fn worker_finalize_request(&self, wid: WorkerId) -> SchedulerResult<()> {
        self.worker_event(WorkerLifecycleEvent::FinalizeRequest { wid })
    }

    pub fn worker_removed(&self, wid: WorkerId) -> SchedulerResult<()> {
        self.worker_event(WorkerLifecycleEvent::Removed { wid })
    }

    /// 有新的可用容量时唤醒调度循环（例如worker完成初始化）
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}

/// 单次循环的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 没有分发也没有处理任何事件
    Idle,
    Progressed,
    /// 当前应用已完成，已经切换到下一个应用
    AppCompleted { app_id: u64 },
    /// 没有更多应用，调度器已停止
    Exhausted,
}

/// 调度循环的退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    Cancelled,
    Exhausted,
}

/// 调度器运行状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub app_id: Option<u64>,
    pub pending: Vec<TaskId>,
    pub in_flight: BTreeMap<WorkerId, Vec<TaskId>>,
    pub completed: usize,
    pub total: usize,
    pub running: bool,
}

impl SchedulerSnapshot {
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.values().map(Vec::len).sum()
    }

    pub fn in_flight_of(&self, wid: WorkerId) -> &[TaskId] {
        self.in_flight.get(&wid).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 任务调度器
///
/// 一次只驱动一个应用，完成后向ApplicationManager请求下一个。
/// 待调度队列、在途任务表和完成计数只在调度循环内部修改，
/// 外部事件全部经由[`SchedulerHandle`]的通道送入。
pub struct Scheduler {
    registry: Arc<WorkerRegistry>,
    transport: Arc<dyn Transport>,
    app_manager: Arc<dyn ApplicationManager>,
    observer: Arc<dyn SchedulerObserver>,
    policy: Policy,
    config: SchedulerConfig,

    app: Option<Application>,
    pending: VecDeque<TaskId>,
    in_flight: BTreeMap<WorkerId, BTreeSet<TaskId>>,
    completed: usize,
    running: bool,

    completed_rx: mpsc::UnboundedReceiver<TaskCompletedEvent>,
    failed_rx: mpsc::UnboundedReceiver<TaskFailedEvent>,
    lifecycle_rx: mpsc::UnboundedReceiver<WorkerLifecycleEvent>,
    handle: SchedulerHandle,
}

impl Scheduler {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        transport: Arc<dyn Transport>,
        app_manager: Arc<dyn ApplicationManager>,
        policy: Policy,
        config: SchedulerConfig,
    ) -> Self {
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();
        let (failed_tx, failed_rx) = mpsc::unbounded_channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();

        Self {
            registry,
            transport,
            app_manager,
            observer: Arc::new(TracingObserver),
            policy,
            config,
            app: None,
            pending: VecDeque::new(),
            in_flight: BTreeMap::new(),
            completed: 0,
            running: true,
            completed_rx,
            failed_rx,
            lifecycle_rx,
            handle: SchedulerHandle {
                completed_tx,
                failed_tx,
                lifecycle_tx,
                notify: Arc::new(Notify::new()),
            },
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SchedulerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 当前（或最后一个）应用，包含调度器维护的任务状态
    pub fn application(&self) -> Option<&Application> {
        self.app.as_ref()
    }

    /// 待调度队列非空
    pub fn has_more_work(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            app_id: self.app.as_ref().map(|app| app.app_id),
            pending: self.pending.iter().copied().collect(),
            in_flight: self
                .in_flight
                .iter()
                .map(|(wid, tids)| (*wid, tids.iter().copied().collect()))
                .collect(),
            completed: self.completed,
            total: self.app.as_ref().map_or(0, Application::task_count),
            running: self.running,
        }
    }

    /// 从ApplicationManager取当前应用并按提交顺序排队；没有应用时返回false
    pub async fn load_current_app(&mut self) -> bool {
        match self.app_manager.current_app().await {
            Some(app) => {
                self.install_app(app);
                true
            }
            None => {
                info!("没有可调度的应用");
                false
            }
        }
    }

    fn install_app(&mut self, mut app: Application) {
        self.pending.clear();
        self.in_flight.clear();
        self.completed = 0;

        for task in app.tasks.values_mut() {
            if task.is_terminal() {
                self.completed += 1;
            } else {
                task.reset_pending();
                self.pending.push_back(task.tid);
            }
        }

        info!(
            app_id = app.app_id,
            name = %app.name,
            total = app.task_count(),
            pending = self.pending.len(),
            "开始调度应用"
        );
        self.app = Some(app);
    }

    /// 执行一次调度循环
    pub async fn step(&mut self) -> StepOutcome {
        if !self.running {
            return StepOutcome::Exhausted;
        }
        if self.app.is_none() && !self.load_current_app().await {
            self.running = false;
            return StepOutcome::Exhausted;
        }

        let mut handled = self.drain_lifecycle().await;
        handled += self.dispatch_pass().await;
        handled += self.drain_completions().await;
        handled += self.drain_failures().await;

        if self.is_app_finished() {
            return self.advance_app().await;
        }

        if handled > 0 {
            StepOutcome::Progressed
        } else {
            StepOutcome::Idle
        }
    }

    /// 运行调度循环，直到收到取消信号或者所有应用执行完毕
    pub async fn run(&mut self, cancel: CancellationToken) -> SchedulerResult<SchedulerExit> {
        info!("调度器启动");
        let idle_wait = self.config.idle_wait();
        let notify = self.handle.notify.clone();

        loop {
            if cancel.is_cancelled() {
                info!(
                    pending = self.pending.len(),
                    in_flight = self.in_flight.values().map(BTreeSet::len).sum::<usize>(),
                    "收到停止信号，调度器退出"
                );
                return Ok(SchedulerExit::Cancelled);
            }

            match self.step().await {
                StepOutcome::Exhausted => {
                    info!("没有更多应用，调度器停止");
                    return Ok(SchedulerExit::Exhausted);
                }
                StepOutcome::Idle => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = notify.notified() => {}
                        _ = tokio::time::sleep(idle_wait) => {}
                    }
                }
                StepOutcome::Progressed | StepOutcome::AppCompleted { .. } => {}
            }
        }
    }

    /// 将待调度任务按FIFO顺序分配给可用worker，返回成功分发的任务数
    ///
    /// 某个worker分发失败后任务放回队首，本轮不再尝试该worker。
    pub async fn dispatch_pass(&mut self) -> usize {
        if self.pending.is_empty() || self.app.is_none() {
            return 0;
        }

        let workers = self.registry.list_available().await;
        let mut dispatched = 0;

        'workers: for worker in workers {
            let mut spare = worker.spare_capacity();
            while spare > 0 {
                let Some(tid) = self.pending.pop_front() else {
                    break 'workers;
                };
                match self.dispatch_one(&worker, tid).await {
                    Ok(()) => {
                        spare -= 1;
                        dispatched += 1;
                    }
                    Err(DispatchError::Requeue(e)) => {
                        self.pending.push_front(tid);
                        if let Some(app) = &self.app {
                            self.observer
                                .dispatch_failed(app.app_id, tid, worker.wid, &e.to_string());
                        }
                        continue 'workers;
                    }
                    Err(DispatchError::Drop(e)) => {
                        self.observer.consistency_warning(&e.to_string());
                    }
                }
            }
        }

        dispatched
    }

    async fn dispatch_one(&mut self, worker: &WorkerEntry, tid: TaskId) -> Result<(), DispatchError> {
        let wid = worker.wid;
        let Some(app) = self.app.as_ref() else {
            return Err(DispatchError::Drop(SchedulerError::task_not_found(tid)));
        };
        let Some(task) = app.get_task(tid) else {
            return Err(DispatchError::Drop(SchedulerError::task_not_found(tid)));
        };
        if task.is_terminal() {
            return Err(DispatchError::Drop(SchedulerError::consistency(format!(
                "任务 {tid} 已经结束，不再分发"
            ))));
        }

        self.registry.assign(wid).await.map_err(DispatchError::Requeue)?;

        let sent = bounded(
            self.config.dispatch_timeout(),
            self.transport.dispatch(worker, app, task),
        )
        .await;

        if let Err(e) = sent {
            if let Err(release_err) = self.registry.release(wid).await {
                warn!(wid, tid, "分发失败后释放worker容量出错: {}", release_err);
            }
            return Err(DispatchError::Requeue(e));
        }

        let app_id = app.app_id;
        if let Some(task) = self.app.as_mut().and_then(|app| app.get_task_mut(tid)) {
            task.mark_processing();
        }
        self.in_flight.entry(wid).or_default().insert(tid);
        self.observer.task_dispatched(app_id, tid, wid);
        Ok(())
    }

    async fn drain_lifecycle(&mut self) -> usize {
        let mut events = Vec::new();
        while let Ok(event) = self.lifecycle_rx.try_recv() {
            events.push(event);
        }
        if events.is_empty() {
            return 0;
        }

        // 回收任务之前先处理已经到达的结果，worker退出前报告的结果仍然有效
        let mut handled = 0;
        if events
            .iter()
            .any(|e| matches!(e, WorkerLifecycleEvent::Removed { .. }))
        {
            handled += self.drain_completions().await;
            handled += self.drain_failures().await;
        }

        for event in events {
            debug!(wid = event.wid(), event = event.event_type(), "处理worker事件");
            match event {
                WorkerLifecycleEvent::Initialize { wid } => self.on_worker_initialized(wid).await,
                WorkerLifecycleEvent::FinalizeRequest { wid } => {
                    self.on_worker_finalize_request(wid).await
                }
                WorkerLifecycleEvent::Removed { wid } => {
                    self.on_worker_removed(wid).await;
                }
            }
            handled += 1;
        }
        handled
    }

    async fn drain_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.completed_rx.try_recv() {
            self.on_task_completed(event).await;
            handled += 1;
        }
        handled
    }

    async fn drain_failures(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.failed_rx.try_recv() {
            self.on_task_failed(event).await;
            handled += 1;
        }
        handled
    }

    /// 从在途表移除；不在表中时返回false
    fn take_in_flight(&mut self, wid: WorkerId, tid: TaskId) -> bool {
        let Some(tids) = self.in_flight.get_mut(&wid) else {
            return false;
        };
        let removed = tids.remove(&tid);
        if tids.is_empty() {
            self.in_flight.remove(&wid);
        }
        removed
    }

    async fn release_worker(&self, wid: WorkerId) {
        if let Err(e) = self.registry.release(wid).await {
            self.observer.consistency_warning(&e.to_string());
        }
    }

    /// 结果属于已经结束的应用
    fn is_stale_app(&self, app_id: u64) -> bool {
        self.app.as_ref().map_or(true, |app| app.app_id != app_id)
    }

    /// 处理任务成功；返回false表示通知已过期或重复，被忽略
    pub async fn on_task_completed(&mut self, event: TaskCompletedEvent) -> bool {
        let TaskCompletedEvent {
            wid,
            app_id,
            tid,
            start_time,
            finish_time,
        } = event;

        if self.is_stale_app(app_id) {
            self.observer.consistency_warning(&format!(
                "收到其他应用的完成通知: app_id={app_id}, wid={wid}, tid={tid}"
            ));
            return false;
        }
        if !self.take_in_flight(wid, tid) {
            self.observer.consistency_warning(&format!(
                "收到不在途任务的完成通知: wid={wid}, tid={tid}"
            ));
            return false;
        }
        self.release_worker(wid).await;

        let Some(app) = self.app.as_mut() else {
            return false;
        };
        let Some(task) = app.get_task_mut(tid) else {
            self.observer
                .consistency_warning(&SchedulerError::task_not_found(tid).to_string());
            return false;
        };
        task.complete(start_time, finish_time, Some(wid));
        self.completed += 1;

        self.observer.task_completed(app.app_id, tid, wid);
        self.app_manager.task_done(app, tid).await;
        true
    }

    /// 处理任务失败，按重试策略决定重新排队还是永久失败
    pub async fn on_task_failed(&mut self, event: TaskFailedEvent) -> bool {
        let TaskFailedEvent { wid, app_id, tid } = event;

        if self.is_stale_app(app_id) {
            self.observer.consistency_warning(&format!(
                "收到其他应用的失败通知: app_id={app_id}, wid={wid}, tid={tid}"
            ));
            return false;
        }
        if !self.take_in_flight(wid, tid) {
            self.observer.consistency_warning(&format!(
                "收到不在途任务的失败通知: wid={wid}, tid={tid}"
            ));
            return false;
        }
        self.release_worker(wid).await;

        let Some(app) = self.app.as_mut() else {
            return false;
        };
        let app_id = app.app_id;
        let Some(task) = app.get_task_mut(tid) else {
            self.observer
                .consistency_warning(&SchedulerError::task_not_found(tid).to_string());
            return false;
        };

        let retry = self.policy.should_retry(task.attempts());
        task.record_failure(Some(wid));
        self.observer.task_failed(app_id, tid, wid, retry);

        if retry {
            task.reset_pending();
            self.pending.push_front(tid);
        } else {
            task.mark_failed();
            self.completed += 1;
            self.app_manager.task_done(app, tid).await;
        }
        true
    }

    /// 向新注册的worker发送当前应用的初始化内容
    pub async fn on_worker_initialized(&mut self, wid: WorkerId) {
        let worker = match self.registry.get(wid).await {
            Ok(worker) => worker,
            Err(e) => {
                warn!(wid, "初始化worker失败: {}", e);
                return;
            }
        };
        let payload = self.init_payload();
        if payload.is_empty() {
            debug!(wid, "应用没有声明初始化过程，发送空的初始化消息");
        }
        let sent = bounded(
            self.config.dispatch_timeout(),
            self.transport.send_init(&worker, payload),
        )
        .await;
        if let Err(e) = sent {
            error!(wid, "发送初始化消息失败: {}", e);
            self.mark_worker_error(wid).await;
        }
    }

    async fn mark_worker_error(&self, wid: WorkerId) {
        if let Err(e) = self.registry.mark_error(wid).await {
            warn!(wid, "标记worker错误状态失败: {}", e);
        }
    }

    /// worker请求结束时发送当前应用的结束过程
    pub async fn on_worker_finalize_request(&mut self, wid: WorkerId) {
        let worker = match self.registry.get(wid).await {
            Ok(worker) => worker,
            Err(e) => {
                warn!(wid, "结束worker失败: {}", e);
                return;
            }
        };
        let payload = self
            .app
            .as_ref()
            .map_or_else(|| ProcedurePayload::empty(0), Application::finalize_payload);
        info!(wid, app_id = payload.app_id, "worker请求结束，发送结束消息");
        let sent = bounded(
            self.config.dispatch_timeout(),
            self.transport.send_finalize(&worker, payload),
        )
        .await;
        if let Err(e) = sent {
            error!(wid, "发送结束消息失败: {}", e);
        }
    }

    /// 回收已移除worker的在途任务，放回队首；重复调用不做任何事情
    pub async fn on_worker_removed(&mut self, wid: WorkerId) -> Vec<TaskId> {
        let Some(tids) = self.in_flight.remove(&wid) else {
            debug!(wid, "worker没有在途任务");
            return Vec::new();
        };
        let reclaimed: Vec<TaskId> = tids.into_iter().collect();

        for &tid in reclaimed.iter().rev() {
            if let Some(task) = self.app.as_mut().and_then(|app| app.get_task_mut(tid)) {
                task.reset_pending();
            }
            self.pending.push_front(tid);
        }

        if let Err(e) = self.registry.reset_assigned(wid).await {
            warn!(wid, "重置worker已分配任务数失败: {}", e);
        }
        self.observer.tasks_reclaimed(wid, &reclaimed);
        reclaimed
    }

    fn init_payload(&self) -> ProcedurePayload {
        self.app
            .as_ref()
            .map_or_else(|| ProcedurePayload::empty(0), Application::init_payload)
    }

    fn is_app_finished(&self) -> bool {
        match &self.app {
            Some(app) => {
                self.pending.is_empty()
                    && self.in_flight.is_empty()
                    && self.completed == app.task_count()
            }
            None => false,
        }
    }

    async fn advance_app(&mut self) -> StepOutcome {
        let Some(app_id) = self.app.as_ref().map(|app| app.app_id) else {
            return StepOutcome::Idle;
        };
        self.observer.app_completed(app_id, self.completed);

        match self.app_manager.next_app().await {
            Some(next) => {
                self.install_app(next);
                self.reinitialize_workers().await;
                StepOutcome::AppCompleted { app_id }
            }
            None => {
                self.running = false;
                StepOutcome::Exhausted
            }
        }
    }

    /// 切换应用后，已就绪的worker回到New状态并收到新应用的初始化内容，
    /// 在收到初始化确认之前不会再分配任务
    async fn reinitialize_workers(&mut self) {
        let payload = self.init_payload();
        for worker in self.registry.alive_workers().await {
            let worker = match self.registry.mark_reinitializing(worker.wid).await {
                Ok(Some(worker)) => worker,
                Ok(None) => continue,
                Err(e) => {
                    debug!(wid = worker.wid, "worker已经被移除: {}", e);
                    continue;
                }
            };
            let sent = bounded(
                self.config.dispatch_timeout(),
                self.transport.send_init(&worker, payload.clone()),
            )
            .await;
            if let Err(e) = sent {
                warn!(wid = worker.wid, "发送新应用初始化消息失败: {}", e);
                self.mark_worker_error(worker.wid).await;
            }
        }
    }
}

enum DispatchError {
    /// 任务放回队首，换下一个worker
    Requeue(SchedulerError),
    /// 任务不再调度
    Drop(SchedulerError),
}

/// 给传输层调用加上超时，超时按传输错误处理
async fn bounded<F>(timeout: Duration, fut: F) -> SchedulerResult<()>
where
    F: Future<Output = SchedulerResult<()>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SchedulerError::transport(format!(
            "发送超时({}ms)",
            timeout.as_millis()
        ))),
    }
}
