use std::collections::{BTreeMap, HashMap};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use distjet_config::RegistryConfig;
use distjet_domain::{WorkerEntry, WorkerStatus};
use distjet_errors::{SchedulerError, SchedulerResult, WorkerId};

#[derive(Debug, Default)]
struct RegistryInner {
    /// 所有注册过的worker，移除后仍保留用于审计；wid单调递增，迭代顺序即注册顺序
    workers: BTreeMap<WorkerId, WorkerEntry>,
    /// uuid -> wid，只包含存活的worker
    alive: HashMap<String, WorkerId>,
    last_wid: WorkerId,
}

impl RegistryInner {
    fn alive_entry(&self, wid: WorkerId) -> SchedulerResult<&WorkerEntry> {
        self.workers
            .get(&wid)
            .filter(|w| w.alive)
            .ok_or_else(|| SchedulerError::worker_not_found(wid))
    }

    fn alive_entry_mut(&mut self, wid: WorkerId) -> SchedulerResult<&mut WorkerEntry> {
        self.workers
            .get_mut(&wid)
            .filter(|w| w.alive)
            .ok_or_else(|| SchedulerError::worker_not_found(wid))
    }
}

/// Worker注册表
///
/// worker身份、容量和存活状态的唯一来源。调度器和传输层接收路径共享同一个实例，
/// 所有写操作通过写锁串行化，读操作使用读锁。
#[derive(Debug)]
pub struct WorkerRegistry {
    inner: RwLock<RegistryInner>,
    lost_timeout: Duration,
    idle_timeout: Duration,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

impl WorkerRegistry {
    pub fn new(lost_timeout: StdDuration, idle_timeout: StdDuration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            lost_timeout: to_chrono(lost_timeout),
            idle_timeout: to_chrono(idle_timeout),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.lost_worker_timeout(), config.idle_worker_timeout())
    }

    /// 注册新worker；同一个uuid已经存活时拒绝，原记录不受影响
    pub async fn register(&self, uuid: &str, max_capacity: u32) -> SchedulerResult<WorkerEntry> {
        let mut inner = self.inner.write().await;

        if let Some(&wid) = inner.alive.get(uuid) {
            warn!("worker已经注册: wid={}, uuid={}", wid, uuid);
            return Err(SchedulerError::DuplicateRegistration {
                uuid: uuid.to_string(),
                wid,
            });
        }

        inner.last_wid += 1;
        let wid = inner.last_wid;
        let entry = WorkerEntry::new(wid, uuid, max_capacity);
        inner.workers.insert(wid, entry.clone());
        inner.alive.insert(uuid.to_string(), wid);

        info!(wid, uuid, max_capacity, "新worker注册成功");
        Ok(entry)
    }

    /// 移除worker：标记为不存活并从存活索引中删除，记录保留用于审计
    pub async fn remove(&self, wid: WorkerId) -> SchedulerResult<WorkerEntry> {
        self.retire(wid, None).await
    }

    /// 因心跳超时移除worker，状态记为Lost
    pub async fn remove_lost(&self, wid: WorkerId) -> SchedulerResult<WorkerEntry> {
        self.retire(wid, Some(WorkerStatus::Lost)).await
    }

    async fn retire(
        &self,
        wid: WorkerId,
        status: Option<WorkerStatus>,
    ) -> SchedulerResult<WorkerEntry> {
        let mut inner = self.inner.write().await;

        let entry = match inner.alive_entry_mut(wid) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("尝试移除未注册的worker: wid={}", wid);
                return Err(e);
            }
        };
        entry.alive = false;
        if let Some(status) = status {
            entry.status = status;
        }
        let removed = entry.clone();
        inner.alive.remove(&removed.uuid);

        info!(wid, uuid = %removed.uuid, status = ?removed.status, "worker已移除");
        Ok(removed)
    }

    pub async fn get(&self, wid: WorkerId) -> SchedulerResult<WorkerEntry> {
        let inner = self.inner.read().await;
        inner.alive_entry(wid).cloned()
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> SchedulerResult<WorkerEntry> {
        let inner = self.inner.read().await;
        let wid = inner
            .alive
            .get(uuid)
            .copied()
            .ok_or_else(|| SchedulerError::worker_uuid_not_found(uuid))?;
        inner.alive_entry(wid).cloned()
    }

    /// 已初始化且还有空闲容量的worker，按注册顺序返回
    pub async fn list_available(&self) -> Vec<WorkerEntry> {
        let inner = self.inner.read().await;
        inner
            .workers
            .values()
            .filter(|w| w.is_available())
            .cloned()
            .collect()
    }

    /// 所有worker记录，包括已经移除的
    pub async fn all_workers(&self) -> Vec<WorkerEntry> {
        let inner = self.inner.read().await;
        inner.workers.values().cloned().collect()
    }

    pub async fn alive_workers(&self) -> Vec<WorkerEntry> {
        let inner = self.inner.read().await;
        inner.workers.values().filter(|w| w.alive).cloned().collect()
    }

    pub async fn alive_count(&self) -> usize {
        self.inner.read().await.alive.len()
    }

    /// 所有已就绪worker的容量之和
    pub async fn total_capacity(&self) -> u64 {
        let inner = self.inner.read().await;
        inner
            .workers
            .values()
            .filter(|w| w.alive && w.status.is_ready())
            .map(|w| u64::from(w.max_capacity))
            .sum()
    }

    /// 收到初始化确认后将worker标记为已初始化
    ///
    /// New（首次初始化或切换应用后重新初始化）和Error（初始化消息发送失败后重新请求）
    /// 状态的worker会变为Initialized，其余状态只更新初始化输出。
    pub async fn mark_initialized(
        &self,
        wid: WorkerId,
        init_output: Option<String>,
    ) -> SchedulerResult<WorkerEntry> {
        let mut inner = self.inner.write().await;
        let entry = inner.alive_entry_mut(wid)?;
        if !matches!(entry.status, WorkerStatus::New | WorkerStatus::Error) {
            debug!(wid, status = ?entry.status, "worker已经初始化过，只更新初始化输出");
            entry.init_output = init_output;
            return Ok(entry.clone());
        }
        entry.mark_initialized(init_output);
        info!(wid, "worker初始化完成");
        Ok(entry.clone())
    }

    /// 切换应用后等待新的初始化确认，期间不接收任务；未就绪的worker返回None
    pub async fn mark_reinitializing(&self, wid: WorkerId) -> SchedulerResult<Option<WorkerEntry>> {
        let mut inner = self.inner.write().await;
        let entry = inner.alive_entry_mut(wid)?;
        if !entry.status.is_ready() {
            return Ok(None);
        }
        entry.status = WorkerStatus::New;
        debug!(wid, "worker等待新应用的初始化确认");
        Ok(Some(entry.clone()))
    }

    /// worker被要求结束当前应用，不再接收新任务
    pub async fn mark_finalizing(&self, wid: WorkerId) -> SchedulerResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner.alive_entry_mut(wid)?;
        entry.status = WorkerStatus::Complete;
        Ok(())
    }

    /// 在同一次写锁内确认worker仍然空闲超时，然后标记为结束中
    ///
    /// 检测到空闲之后调度器可能已经分配了新任务，此时返回false，worker保持原状态。
    pub async fn finalize_if_idle(&self, wid: WorkerId, now: DateTime<Utc>) -> SchedulerResult<bool> {
        let mut inner = self.inner.write().await;
        let idle_timeout = self.idle_timeout;
        let entry = inner.alive_entry_mut(wid)?;
        if !entry.status.is_ready() || !entry.is_idle_timeout(now, idle_timeout) {
            return Ok(false);
        }
        entry.status = WorkerStatus::Complete;
        Ok(true)
    }

    pub async fn set_fin_output(&self, wid: WorkerId, output: String) -> SchedulerResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner.alive_entry_mut(wid)?;
        entry.fin_output = Some(output);
        entry.status = WorkerStatus::Complete;
        Ok(())
    }

    /// 初始化消息无法送达，worker在重新请求初始化之前不接收任务
    pub async fn mark_error(&self, wid: WorkerId) -> SchedulerResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner.alive_entry_mut(wid)?;
        entry.status = WorkerStatus::Error;
        Ok(())
    }

    /// 收到worker任何消息时更新最后联系时间
    pub async fn touch(&self, wid: WorkerId) -> SchedulerResult<()> {
        let mut inner = self.inner.write().await;
        inner.alive_entry_mut(wid)?.touch(Utc::now());
        Ok(())
    }

    pub async fn touch_by_uuid(&self, uuid: &str) -> SchedulerResult<WorkerId> {
        let mut inner = self.inner.write().await;
        let wid = inner
            .alive
            .get(uuid)
            .copied()
            .ok_or_else(|| SchedulerError::worker_uuid_not_found(uuid))?;
        inner.alive_entry_mut(wid)?.touch(Utc::now());
        Ok(wid)
    }

    /// 占用worker的一个容量
    pub async fn assign(&self, wid: WorkerId) -> SchedulerResult<u32> {
        let mut inner = self.inner.write().await;
        let entry = inner.alive_entry_mut(wid)?;
        if !entry.assign() {
            return Err(SchedulerError::CapacityExceeded { wid });
        }
        Ok(entry.assigned)
    }

    /// 释放worker的一个容量，已移除的worker同样适用
    pub async fn release(&self, wid: WorkerId) -> SchedulerResult<u32> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .workers
            .get_mut(&wid)
            .ok_or_else(|| SchedulerError::worker_not_found(wid))?;
        if !entry.release(Utc::now()) {
            return Err(SchedulerError::consistency(format!(
                "worker {wid} 的已分配任务数已经为0"
            )));
        }
        Ok(entry.assigned)
    }

    /// 回收worker上的全部任务后清零计数，已移除的worker同样适用
    pub async fn reset_assigned(&self, wid: WorkerId) -> SchedulerResult<u32> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .workers
            .get_mut(&wid)
            .ok_or_else(|| SchedulerError::worker_not_found(wid))?;
        let previous = entry.assigned;
        entry.assigned = 0;
        if entry.alive {
            entry.idle_since = Some(Utc::now());
        }
        Ok(previous)
    }

    pub async fn is_lost(&self, wid: WorkerId) -> SchedulerResult<bool> {
        self.is_lost_at(wid, Utc::now()).await
    }

    pub async fn is_lost_at(&self, wid: WorkerId, now: DateTime<Utc>) -> SchedulerResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.alive_entry(wid)?.is_lost(now, self.lost_timeout))
    }

    pub async fn is_idle_timeout(&self, wid: WorkerId) -> SchedulerResult<bool> {
        self.is_idle_timeout_at(wid, Utc::now()).await
    }

    pub async fn is_idle_timeout_at(
        &self,
        wid: WorkerId,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.alive_entry(wid)?.is_idle_timeout(now, self.idle_timeout))
    }

    /// 心跳超时的存活worker
    pub async fn list_lost_at(&self, now: DateTime<Utc>) -> Vec<WorkerId> {
        let inner = self.inner.read().await;
        inner
            .workers
            .values()
            .filter(|w| w.alive && w.is_lost(now, self.lost_timeout))
            .map(|w| w.wid)
            .collect()
    }

    /// 空闲超时且尚未被要求结束的worker
    pub async fn list_idle_timeout_at(&self, now: DateTime<Utc>) -> Vec<WorkerId> {
        let inner = self.inner.read().await;
        inner
            .workers
            .values()
            .filter(|w| {
                w.alive
                    && w.status.is_ready()
                    && w.is_idle_timeout(now, self.idle_timeout)
            })
            .map(|w| w.wid)
            .collect()
    }

    #[cfg(test)]
    async fn set_last_contact(&self, wid: WorkerId, at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.workers.get_mut(&wid) {
            entry.last_contact_time = at;
        }
    }
}

fn to_chrono(duration: StdDuration) -> Duration {
    Duration::milliseconds(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> WorkerRegistry {
        WorkerRegistry::new(StdDuration::from_secs(10), StdDuration::from_secs(100))
    }

    #[tokio::test]
    async fn test_wids_are_monotonic() {
        let registry = registry();
        let w1 = registry.register("a", 1).await.unwrap();
        let w2 = registry.register("b", 1).await.unwrap();
        registry.remove(w1.wid).await.unwrap();
        let w3 = registry.register("a", 1).await.unwrap();

        assert_eq!(w1.wid, 1);
        assert_eq!(w2.wid, 2);
        assert_eq!(w3.wid, 3);
        assert_eq!(registry.all_workers().await.len(), 3);
        assert_eq!(registry.alive_count().await, 2);
    }

    #[tokio::test]
    async fn test_lost_detection_uses_last_contact() {
        let registry = registry();
        let worker = registry.register("a", 1).await.unwrap();
        let now = Utc::now();

        assert!(!registry.is_lost_at(worker.wid, now).await.unwrap());

        registry
            .set_last_contact(worker.wid, now - Duration::seconds(11))
            .await;
        assert!(registry.is_lost_at(worker.wid, now).await.unwrap());
        assert_eq!(registry.list_lost_at(now).await, vec![worker.wid]);

        registry.touch(worker.wid).await.unwrap();
        assert!(!registry.is_lost(worker.wid).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_on_retired_worker() {
        let registry = registry();
        let worker = registry.register("a", 2).await.unwrap();
        registry.mark_initialized(worker.wid, None).await.unwrap();
        registry.assign(worker.wid).await.unwrap();
        registry.remove(worker.wid).await.unwrap();

        assert!(registry.assign(worker.wid).await.is_err());
        assert_eq!(registry.release(worker.wid).await.unwrap(), 0);
        assert!(registry.release(worker.wid).await.is_err());
    }
}
