use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use distjet_domain::{Application, ApplicationManager, TaskId};

#[derive(Debug, Default)]
struct ManagerState {
    current: Option<Application>,
    queue: VecDeque<Application>,
    done: Vec<(u64, TaskId)>,
}

/// 内存中的应用管理器，按提交顺序依次提供应用
#[derive(Debug, Default)]
pub struct InMemoryApplicationManager {
    state: Mutex<ManagerState>,
}

impl InMemoryApplicationManager {
    pub fn new(apps: impl IntoIterator<Item = Application>) -> Self {
        let mut queue: VecDeque<Application> = apps.into_iter().collect();
        let current = queue.pop_front();
        Self {
            state: Mutex::new(ManagerState {
                current,
                queue,
                done: Vec::new(),
            }),
        }
    }

    pub async fn submit(&self, app: Application) {
        let mut state = self.state.lock().await;
        info!(app_id = app.app_id, name = %app.name, tasks = app.task_count(), "提交新应用");
        if state.current.is_none() {
            state.current = Some(app);
        } else {
            state.queue.push_back(app);
        }
    }

    /// 已经完成（成功或永久失败）的 (app_id, tid)
    pub async fn finished_tasks(&self) -> Vec<(u64, TaskId)> {
        self.state.lock().await.done.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.state.lock().await.queue.len()
    }
}

#[async_trait]
impl ApplicationManager for InMemoryApplicationManager {
    async fn current_app(&self) -> Option<Application> {
        self.state.lock().await.current.clone()
    }

    async fn next_app(&self) -> Option<Application> {
        let mut state = self.state.lock().await;
        state.current = state.queue.pop_front();
        if let Some(app) = &state.current {
            info!(app_id = app.app_id, name = %app.name, "切换到下一个应用");
        }
        state.current.clone()
    }

    async fn task_done(&self, app: &Application, tid: TaskId) {
        debug!(app_id = app.app_id, tid, "任务已结束");
        let mut state = self.state.lock().await;
        if let Some(current) = state.current.as_mut().filter(|c| c.app_id == app.app_id) {
            if let Some(task) = app.get_task(tid) {
                current.tasks.insert(tid, task.clone());
            }
        }
        state.done.push((app.app_id, tid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distjet_domain::Task;

    #[tokio::test]
    async fn test_apps_are_served_in_order() {
        let manager = InMemoryApplicationManager::new(vec![
            Application::new(1, "first"),
            Application::new(2, "second"),
        ]);

        assert_eq!(manager.current_app().await.unwrap().app_id, 1);
        assert_eq!(manager.next_app().await.unwrap().app_id, 2);
        assert!(manager.next_app().await.is_none());
        assert!(manager.current_app().await.is_none());
    }

    #[tokio::test]
    async fn test_submit_into_empty_manager() {
        let manager = InMemoryApplicationManager::default();
        assert!(manager.current_app().await.is_none());

        let app = Application::new(5, "late").with_tasks(vec![Task::new(1)]);
        manager.submit(app.clone()).await;
        assert_eq!(manager.current_app().await.unwrap().app_id, 5);

        manager.task_done(&app, 1).await;
        assert_eq!(manager.finished_tasks().await, vec![(5, 1)]);
    }
}
