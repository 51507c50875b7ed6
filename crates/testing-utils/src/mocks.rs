//! 测试替身
//!
//! 内存中的传输层、应用管理器和观察者实现，用于在不启动worker的情况下
//! 驱动调度器。

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use distjet_dispatcher::SchedulerObserver;
use distjet_domain::{
    Application, ApplicationManager, MasterMessage, MessageTag, ProcedurePayload, TaskAssignment,
    TaskId, Transport, WorkerId,
};
use distjet_errors::{SchedulerError, SchedulerResult};

/// 记录所有发出的消息，可以按需注入发送失败
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<(String, MasterMessage)>>>,
    fail_next: Arc<Mutex<usize>>,
    failing_uuids: Arc<Mutex<HashSet<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来的`count`次发送全部失败
    pub fn fail_next(&self, count: usize) {
        *self.fail_next.lock().unwrap() = count;
    }

    /// 发往指定worker的消息全部失败，直到调用`recover`
    pub fn fail_uuid(&self, uuid: &str) {
        self.failing_uuids.lock().unwrap().insert(uuid.to_string());
    }

    pub fn recover(&self, uuid: &str) {
        self.failing_uuids.lock().unwrap().remove(uuid);
    }

    pub fn sent(&self) -> Vec<(String, MasterMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, uuid: &str) -> Vec<MasterMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == uuid)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// 按发送顺序返回 (uuid, tid)
    pub fn dispatched(&self) -> Vec<(String, TaskId)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(to, message)| match message {
                MasterMessage::TaskAdd(assignment) => Some((to.clone(), assignment.tid)),
                _ => None,
            })
            .collect()
    }

    /// 按发送顺序返回 (uuid, 任务分配内容)
    pub fn assignments(&self) -> Vec<(String, TaskAssignment)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(to, message)| match message {
                MasterMessage::TaskAdd(assignment) => Some((to.clone(), assignment.clone())),
                _ => None,
            })
            .collect()
    }

    /// 发往指定worker的消息标识，按发送顺序
    pub fn tags_to(&self, uuid: &str) -> Vec<MessageTag> {
        self.sent_to(uuid).iter().map(MasterMessage::tag).collect()
    }

    pub fn dispatched_tids(&self) -> Vec<TaskId> {
        self.dispatched().into_iter().map(|(_, tid)| tid).collect()
    }

    pub fn init_payloads_to(&self, uuid: &str) -> Vec<ProcedurePayload> {
        self.sent_to(uuid)
            .into_iter()
            .filter_map(|message| match message {
                MasterMessage::AppInit(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_payloads_to(&self, uuid: &str) -> Vec<ProcedurePayload> {
        self.sent_to(uuid)
            .into_iter()
            .filter_map(|message| match message {
                MasterMessage::AppFinalize(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, uuid: &str, message: MasterMessage) -> SchedulerResult<()> {
        {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(SchedulerError::transport(format!("模拟发送失败: {uuid}")));
            }
        }
        if self.failing_uuids.lock().unwrap().contains(uuid) {
            return Err(SchedulerError::transport(format!("模拟worker不可达: {uuid}")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((uuid.to_string(), message));
        Ok(())
    }
}

/// 按顺序提供应用，记录task_done通知
#[derive(Debug, Clone, Default)]
pub struct MockApplicationManager {
    current: Arc<Mutex<Option<Application>>>,
    queue: Arc<Mutex<VecDeque<Application>>>,
    done: Arc<Mutex<Vec<(u64, TaskId)>>>,
    next_app_calls: Arc<Mutex<usize>>,
}

impl MockApplicationManager {
    pub fn new(apps: Vec<Application>) -> Self {
        let mut queue: VecDeque<Application> = apps.into();
        let current = queue.pop_front();
        Self {
            current: Arc::new(Mutex::new(current)),
            queue: Arc::new(Mutex::new(queue)),
            ..Self::default()
        }
    }

    pub fn done(&self) -> Vec<(u64, TaskId)> {
        self.done.lock().unwrap().clone()
    }

    pub fn done_tids(&self, app_id: u64) -> Vec<TaskId> {
        self.done
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == app_id)
            .map(|(_, tid)| *tid)
            .collect()
    }

    pub fn next_app_calls(&self) -> usize {
        *self.next_app_calls.lock().unwrap()
    }
}

#[async_trait]
impl ApplicationManager for MockApplicationManager {
    async fn current_app(&self) -> Option<Application> {
        self.current.lock().unwrap().clone()
    }

    async fn next_app(&self) -> Option<Application> {
        *self.next_app_calls.lock().unwrap() += 1;
        let next = self.queue.lock().unwrap().pop_front();
        *self.current.lock().unwrap() = next.clone();
        next
    }

    async fn task_done(&self, app: &Application, tid: TaskId) {
        self.done.lock().unwrap().push((app.app_id, tid));
    }
}

/// 观察者记录的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Dispatched { tid: TaskId, wid: WorkerId },
    DispatchFailed { tid: TaskId, wid: WorkerId },
    Completed { tid: TaskId, wid: WorkerId },
    Failed { tid: TaskId, wid: WorkerId, retry: bool },
    Reclaimed { wid: WorkerId, tids: Vec<TaskId> },
    ConsistencyWarning(String),
    AppCompleted { app_id: u64, total: usize },
}

#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ObservedEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, ObservedEvent::ConsistencyWarning(_)))
            .count()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl SchedulerObserver for RecordingObserver {
    fn task_dispatched(&self, _app_id: u64, tid: TaskId, wid: WorkerId) {
        self.push(ObservedEvent::Dispatched { tid, wid });
    }

    fn dispatch_failed(&self, _app_id: u64, tid: TaskId, wid: WorkerId, _reason: &str) {
        self.push(ObservedEvent::DispatchFailed { tid, wid });
    }

    fn task_completed(&self, _app_id: u64, tid: TaskId, wid: WorkerId) {
        self.push(ObservedEvent::Completed { tid, wid });
    }

    fn task_failed(&self, _app_id: u64, tid: TaskId, wid: WorkerId, retry: bool) {
        self.push(ObservedEvent::Failed { tid, wid, retry });
    }

    fn tasks_reclaimed(&self, wid: WorkerId, tids: &[TaskId]) {
        self.push(ObservedEvent::Reclaimed {
            wid,
            tids: tids.to_vec(),
        });
    }

    fn consistency_warning(&self, message: &str) {
        self.push(ObservedEvent::ConsistencyWarning(message.to_string()));
    }

    fn app_completed(&self, app_id: u64, total: usize) {
        self.push(ObservedEvent::AppCompleted { app_id, total });
    }
}
