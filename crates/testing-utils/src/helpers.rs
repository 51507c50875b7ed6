//! 测试辅助函数

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use distjet_dispatcher::WorkerRegistry;
use distjet_domain::WorkerEntry;

/// 注册worker并直接标记为已初始化
pub async fn registered_ready_worker(
    registry: &WorkerRegistry,
    uuid: &str,
    max_capacity: u32,
) -> WorkerEntry {
    let worker = registry
        .register(uuid, max_capacity)
        .await
        .expect("register worker");
    registry
        .mark_initialized(worker.wid, Some(String::new()))
        .await
        .expect("mark worker initialized")
}

pub struct TestEnv;

impl TestEnv {
    /// 在超时之前等待条件成立
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// 初始化测试日志，多次调用是安全的
    pub fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }
}
