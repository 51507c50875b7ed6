//! 测试数据构造器

use distjet_domain::{Application, Procedure, Task, TaskId, TaskStatus};

pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(tid: TaskId) -> Self {
        Self {
            task: Task::new(tid).with_payload("run.sh", format!("input-{tid}")),
        }
    }

    pub fn with_boot(mut self, boot: &str) -> Self {
        self.task.boot = boot.to_string();
        self
    }

    pub fn with_data(mut self, data: &str) -> Self {
        self.task.data = data.to_string();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

pub struct ApplicationBuilder {
    app: Application,
}

impl ApplicationBuilder {
    pub fn new(app_id: u64) -> Self {
        Self {
            app: Application::new(app_id, format!("test-app-{app_id}")),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.app.name = name.to_string();
        self
    }

    /// 添加tid为1..=count的任务
    pub fn with_tasks(mut self, count: u64) -> Self {
        for tid in 1..=count {
            self.app.tasks.insert(tid, TaskBuilder::new(tid).build());
        }
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.app.tasks.insert(task.tid, task);
        self
    }

    pub fn with_init(mut self, boot: &str, data: &str, resource_dir: &str) -> Self {
        self.app.init = Some(Procedure::new(boot, data, resource_dir));
        self
    }

    pub fn with_finalize(mut self, boot: &str, data: &str, resource_dir: &str) -> Self {
        self.app.finalize = Some(Procedure::new(boot, data, resource_dir));
        self
    }

    pub fn with_resource_dir(mut self, resource_dir: &str) -> Self {
        self.app.resource_dir = resource_dir.to_string();
        self
    }

    pub fn build(self) -> Application {
        self.app
    }
}
