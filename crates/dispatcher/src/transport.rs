use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};

use distjet_domain::{Envelope, MasterMessage, Transport, WorkerMessage};
use distjet_errors::{SchedulerError, SchedulerResult};

pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// 进程内传输层
///
/// 每个连接的worker拥有一个有界的发件箱，master使用`try_send`投递，
/// 发件箱满或者worker已断开都会立即返回传输错误，不会阻塞调度循环。
/// worker发往master的消息统一进入一个无界的收件箱。
pub struct ChannelTransport {
    sender_id: String,
    outbox_capacity: usize,
    outboxes: RwLock<HashMap<String, mpsc::Sender<Envelope<MasterMessage>>>>,
    inbound_tx: mpsc::UnboundedSender<Envelope<WorkerMessage>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope<WorkerMessage>>>>,
}

impl ChannelTransport {
    pub fn new(sender_id: impl Into<String>, outbox_capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sender_id: sender_id.into(),
            outbox_capacity: outbox_capacity.max(1),
            outboxes: RwLock::new(HashMap::new()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        }
    }

    /// 建立worker连接；同一个uuid重复连接时替换旧的发件箱
    pub async fn connect(&self, uuid: impl Into<String>) -> WorkerLink {
        let uuid = uuid.into();
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let replaced = self.outboxes.write().await.insert(uuid.clone(), tx);
        if replaced.is_some() {
            debug!(uuid = %uuid, "worker重新连接，替换旧的发件箱");
        }
        WorkerLink {
            uuid,
            outbox: rx,
            inbound: self.inbound_tx.clone(),
        }
    }

    pub async fn disconnect(&self, uuid: &str) -> bool {
        self.outboxes.write().await.remove(uuid).is_some()
    }

    pub async fn is_connected(&self, uuid: &str) -> bool {
        self.outboxes
            .read()
            .await
            .get(uuid)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// 取走master端的收件箱，只能取一次
    pub async fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<Envelope<WorkerMessage>>> {
        self.inbound_rx.lock().await.take()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new("master", DEFAULT_OUTBOX_CAPACITY)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, uuid: &str, message: MasterMessage) -> SchedulerResult<()> {
        let outboxes = self.outboxes.read().await;
        let tx = outboxes
            .get(uuid)
            .ok_or_else(|| SchedulerError::transport(format!("worker未连接: {uuid}")))?;

        let envelope = Envelope::from_master(self.sender_id.clone(), message);
        tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(envelope) => {
                warn!(uuid, tag = ?envelope.tag, "worker发件箱已满");
                SchedulerError::transport(format!("worker发件箱已满: {uuid}"))
            }
            mpsc::error::TrySendError::Closed(_) => {
                SchedulerError::transport(format!("worker连接已关闭: {uuid}"))
            }
        })
    }
}

/// worker端持有的连接
#[derive(Debug)]
pub struct WorkerLink {
    uuid: String,
    outbox: mpsc::Receiver<Envelope<MasterMessage>>,
    inbound: mpsc::UnboundedSender<Envelope<WorkerMessage>>,
}

impl WorkerLink {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn send(&self, message: WorkerMessage) -> SchedulerResult<()> {
        self.inbound
            .send(Envelope::from_worker(self.uuid.clone(), message))
            .map_err(|_| SchedulerError::ChannelClosed("master收件箱已关闭".to_string()))
    }

    pub async fn recv(&mut self) -> Option<Envelope<MasterMessage>> {
        self.outbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope<MasterMessage>> {
        self.outbox.try_recv().ok()
    }

    /// 拆分为接收端和发送端，方便在不同任务中使用
    pub fn split(self) -> (WorkerSender, mpsc::Receiver<Envelope<MasterMessage>>) {
        (
            WorkerSender {
                uuid: self.uuid,
                inbound: self.inbound,
            },
            self.outbox,
        )
    }
}

/// worker端的发送句柄，可克隆
#[derive(Debug, Clone)]
pub struct WorkerSender {
    uuid: String,
    inbound: mpsc::UnboundedSender<Envelope<WorkerMessage>>,
}

impl WorkerSender {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn send(&self, message: WorkerMessage) -> SchedulerResult<()> {
        self.inbound
            .send(Envelope::from_worker(self.uuid.clone(), message))
            .map_err(|_| SchedulerError::ChannelClosed("master收件箱已关闭".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_to_unknown_worker_fails() {
        let transport = ChannelTransport::default();
        let err = transport
            .send("missing", MasterMessage::TaskSync)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_full_outbox_does_not_block() {
        let transport = ChannelTransport::new("master", 1);
        let mut link = transport.connect("w-1").await;

        transport.send("w-1", MasterMessage::TaskSync).await.unwrap();
        let err = transport.send("w-1", MasterMessage::WorkerStop).await;
        assert!(matches!(err, Err(SchedulerError::Transport(_))));

        let envelope = link.recv().await.unwrap();
        assert_eq!(envelope.body, MasterMessage::TaskSync);
        assert_eq!(envelope.sender, "master");
    }

    #[tokio::test]
    async fn test_worker_messages_reach_inbound() {
        let transport = ChannelTransport::default();
        let mut inbound = transport.take_inbound().await.unwrap();
        assert!(transport.take_inbound().await.is_none());

        let link = transport.connect("w-1").await;
        link.send(WorkerMessage::register("w-1", 2).unwrap()).unwrap();

        let envelope = inbound.recv().await.unwrap();
        assert_eq!(envelope.sender, "w-1");
        assert!(envelope.tag.is_control());
    }

    #[tokio::test]
    async fn test_dropped_link_is_closed() {
        let transport = ChannelTransport::default();
        let link = transport.connect("w-1").await;
        assert!(transport.is_connected("w-1").await);
        drop(link);
        assert!(!transport.is_connected("w-1").await);
        assert!(transport.send("w-1", MasterMessage::TaskSync).await.is_err());
        assert!(transport.disconnect("w-1").await);
    }
}
