use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use distjet::app::MasterApp;
use distjet::shutdown::ShutdownManager;
use distjet_config::{AppConfig, LogLevel, OutputFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("distjet")
        .version("1.0.0")
        .about("分布式任务农场调度系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次查找默认路径"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .help("本地模拟worker数量")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str))
        .with_context(|| format!("加载配置失败: {config_path:?}"))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.local.workers = *workers;
        config.local.validate()?;
    }

    init_logging(config.logging.level, config.logging.format)?;

    info!("启动分布式任务农场调度系统");
    info!(
        workers = config.local.workers,
        applications = config.local.applications.len(),
        redo = config.policy.redo_if_failed(),
        redo_limit = config.policy.redo_limit(),
        "加载配置完成"
    );

    let shutdown_manager = ShutdownManager::new();
    let app = MasterApp::new(config);
    let mut app_handle = tokio::spawn(app.run(shutdown_manager.subscribe()));

    tokio::select! {
        result = &mut app_handle => {
            report(result);
            info!("分布式任务农场调度系统已退出");
            return Ok(());
        }
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
    }

    shutdown_manager.shutdown();

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(result) => report(result),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("分布式任务农场调度系统已退出");
    Ok(())
}

fn report(
    result: std::result::Result<Result<distjet::app::RunSummary>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(summary)) => {
            let failed: usize = summary.workers.iter().map(|w| w.failed).sum();
            info!(
                exit = ?summary.exit,
                finished_tasks = summary.finished_tasks,
                failed_attempts = failed,
                "运行结束"
            );
        }
        Ok(Err(e)) => error!("应用运行失败: {:#}", e),
        Err(e) => error!("应用任务异常结束: {}", e),
    }
}

/// 初始化日志系统
fn init_logging(log_level: LogLevel, log_format: OutputFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        OutputFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        OutputFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
