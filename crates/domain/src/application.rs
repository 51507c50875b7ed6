use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::messages::ProcedurePayload;
use crate::task::Task;
use crate::TaskId;

/// 应用的初始化/结束过程
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Procedure {
    pub boot: String,
    pub data: String,
    pub resource_dir: String,
}

impl Procedure {
    pub fn new(
        boot: impl Into<String>,
        data: impl Into<String>,
        resource_dir: impl Into<String>,
    ) -> Self {
        Self {
            boot: boot.into(),
            data: data.into(),
            resource_dir: resource_dir.into(),
        }
    }
}

/// 应用：由若干相互独立的任务组成
///
/// 应用由外部的ApplicationManager持有和创建，调度器只修改其中任务的状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub app_id: u64,
    pub name: String,
    /// tid -> Task，迭代顺序即提交顺序；重复的tid替换原任务但保留原位置
    pub tasks: IndexMap<TaskId, Task>,
    pub init: Option<Procedure>,
    pub finalize: Option<Procedure>,
    /// 任务执行时使用的资源目录
    pub resource_dir: String,
}

impl Application {
    pub fn new(app_id: u64, name: impl Into<String>) -> Self {
        Self {
            app_id,
            name: name.into(),
            tasks: IndexMap::new(),
            init: None,
            finalize: None,
            resource_dir: String::new(),
        }
    }

    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        for task in tasks {
            self.tasks.insert(task.tid, task);
        }
        self
    }

    pub fn with_init(mut self, init: Procedure) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_finalize(mut self, finalize: Procedure) -> Self {
        self.finalize = Some(finalize);
        self
    }

    pub fn with_resource_dir(mut self, resource_dir: impl Into<String>) -> Self {
        self.resource_dir = resource_dir.into();
        self
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    pub fn get_task(&self, tid: TaskId) -> Option<&Task> {
        self.tasks.get(&tid)
    }

    pub fn get_task_mut(&mut self, tid: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&tid)
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.values().all(Task::is_terminal)
    }

    /// 初始化消息内容；未声明初始化过程时所有字段为空
    pub fn init_payload(&self) -> ProcedurePayload {
        ProcedurePayload::from_procedure(self.app_id, self.init.as_ref())
    }

    pub fn finalize_payload(&self) -> ProcedurePayload {
        ProcedurePayload::from_procedure(self.app_id, self.finalize.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_keep_submission_order() {
        let app = Application::new(1, "demo").with_tasks(vec![Task::new(3), Task::new(1), Task::new(2)]);
        assert_eq!(app.task_count(), 3);
        assert_eq!(app.task_ids(), vec![3, 1, 2]);

        let app = app.with_tasks(vec![Task::new(1).with_payload("again.sh", ""), Task::new(9)]);
        assert_eq!(app.task_ids(), vec![3, 1, 2, 9]);
        assert_eq!(app.get_task(1).unwrap().boot, "again.sh");
        assert!(!app.is_finished());
    }

    #[test]
    fn test_empty_init_payload() {
        let app = Application::new(7, "no-init");
        let payload = app.init_payload();
        assert_eq!(payload.app_id, 7);
        assert!(payload.is_empty());

        let payload = app.finalize_payload();
        assert!(payload.boot.is_empty());
        assert!(payload.data.is_empty());
        assert!(payload.resource_dir.is_empty());
    }

    #[test]
    fn test_declared_init_payload() {
        let app = Application::new(2, "with-init")
            .with_init(Procedure::new("setup.sh", "cfg", "/opt/res"))
            .with_finalize(Procedure::new("teardown.sh", "", "/opt/res"));

        let init = app.init_payload();
        assert_eq!(init.boot, "setup.sh");
        assert_eq!(init.data, "cfg");
        assert_eq!(init.resource_dir, "/opt/res");
        assert!(!init.is_empty());

        let fin = app.finalize_payload();
        assert_eq!(fin.boot, "teardown.sh");
    }
}
