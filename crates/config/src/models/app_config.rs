use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatcher_worker::{LocalClusterConfig, RegistryConfig, SchedulerConfig},
    logging::LoggingConfig,
};
use crate::policy::Policy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub local: LocalClusterConfig,
}

impl AppConfig {
    /// 加载配置：默认值 < 配置文件 < DISTJET_前缀的环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default()).context("生成默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/distjet.toml", "distjet.toml", "/etc/distjet/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DISTJET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.scheduler.validate()?;
        self.local.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogLevel, OutputFormat};
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(config.policy.redo_if_failed());
        assert_eq!(config.registry.lost_worker_timeout_seconds, 10);
        assert_eq!(config.registry.idle_worker_timeout_seconds, 100);
        assert_eq!(config.scheduler.idle_wait_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[policy]
redo_if_failed = true
redo_limit = 2

[registry]
lost_worker_timeout_seconds = 5
idle_worker_timeout_seconds = 60
monitor_interval_ms = 500

[scheduler]
idle_wait_ms = 50
dispatch_timeout_ms = 1000

[logging]
level = "debug"
format = "json"
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse TOML");
        assert_eq!(config.policy.redo_limit(), 2);
        assert_eq!(config.registry.lost_worker_timeout_seconds, 5);
        assert_eq!(config.scheduler.idle_wait_ms, 50);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, OutputFormat::Json);
        assert_eq!(config.local.workers, 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let toml_str = r#"
[scheduler]
idle_wait_ms = 0
dispatch_timeout_ms = 1000
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());

        let mut config = AppConfig::default();
        config.local.failure_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().expect("Failed to serialize");
        let parsed = AppConfig::from_toml(&toml_str).expect("Failed to parse");
        assert_eq!(parsed.policy, config.policy);
        assert_eq!(parsed.local.applications.len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("Failed to create temp file");
        writeln!(
            file,
            "[policy]\nredo_if_failed = false\nredo_limit = 0\n\n[local]\nworkers = 2\nworker_capacity = 3\nfailure_rate = 0.0\ntask_duration_ms = 10\nheartbeat_interval_ms = 100\n\n[[local.applications]]\nname = \"from-file\"\ntask_count = 3\n"
        )
        .expect("Failed to write config");

        let path = file.path().to_string_lossy().to_string();
        let config = AppConfig::load(Some(&path)).expect("Failed to load config");
        assert!(!config.policy.redo_if_failed());
        assert_eq!(config.local.workers, 2);
        assert_eq!(config.local.worker_capacity, 3);
        assert_eq!(config.local.applications[0].name, "from-file");
        assert_eq!(config.local.applications[0].task_count, 3);
        assert_eq!(config.registry.lost_worker_timeout_seconds, 10);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/distjet.toml")).is_err());
    }
}
