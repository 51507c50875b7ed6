#[cfg(test)]
mod error_tests {
    use crate::*;

    #[test]
    fn test_scheduler_error_display() {
        let transport_error = SchedulerError::Transport("outbox full".to_string());
        assert_eq!(transport_error.to_string(), "传输错误: outbox full");

        let duplicate = SchedulerError::DuplicateRegistration {
            uuid: "w-1".to_string(),
            wid: 3,
        };
        assert_eq!(duplicate.to_string(), "Worker重复注册: uuid=w-1, 已存在wid=3");

        let worker_error = SchedulerError::WorkerNotFound { wid: 7 };
        assert_eq!(worker_error.to_string(), "Worker未找到: 7");

        let uuid_error = SchedulerError::WorkerUuidNotFound {
            uuid: "w-9".to_string(),
        };
        assert_eq!(uuid_error.to_string(), "Worker未找到: uuid=w-9");

        let task_error = SchedulerError::TaskNotFound { tid: 12 };
        assert_eq!(task_error.to_string(), "任务未找到: 12");

        let consistency = SchedulerError::Consistency("stale completion".to_string());
        assert_eq!(consistency.to_string(), "状态不一致: stale completion");

        let capacity = SchedulerError::CapacityExceeded { wid: 2 };
        assert_eq!(capacity.to_string(), "Worker容量已满: 2");

        let config_error = SchedulerError::Configuration("redo_limit".to_string());
        assert_eq!(config_error.to_string(), "配置错误: redo_limit");

        let internal_error = SchedulerError::Internal("Unexpected error".to_string());
        assert_eq!(internal_error.to_string(), "内部错误: Unexpected error");
    }

    #[test]
    fn test_scheduler_error_creation_methods() {
        let error = SchedulerError::transport("send failed");
        assert!(matches!(error, SchedulerError::Transport(_)));

        let error = SchedulerError::worker_not_found(5);
        assert!(matches!(error, SchedulerError::WorkerNotFound { wid: 5 }));

        let error = SchedulerError::worker_uuid_not_found("abc");
        assert!(matches!(error, SchedulerError::WorkerUuidNotFound { .. }));

        let error = SchedulerError::task_not_found(9);
        assert!(matches!(error, SchedulerError::TaskNotFound { tid: 9 }));

        let error = SchedulerError::consistency("unknown tid");
        assert!(matches!(error, SchedulerError::Consistency(_)));

        let error = SchedulerError::invalid_message("empty uuid");
        assert!(matches!(error, SchedulerError::InvalidMessage(_)));

        let error = SchedulerError::config_error("bad value");
        assert!(matches!(error, SchedulerError::Configuration(_)));
    }

    #[test]
    fn test_error_classification() {
        assert!(SchedulerError::transport("x").is_retryable());
        assert!(SchedulerError::CapacityExceeded { wid: 1 }.is_retryable());
        assert!(!SchedulerError::worker_not_found(1).is_retryable());
        assert!(!SchedulerError::Internal("x".to_string()).is_retryable());

        assert!(SchedulerError::worker_not_found(1).is_not_found());
        assert!(SchedulerError::worker_uuid_not_found("u").is_not_found());
        assert!(SchedulerError::task_not_found(1).is_not_found());
        assert!(!SchedulerError::transport("x").is_not_found());

        assert!(SchedulerError::consistency("x").is_consistency_warning());
        assert!(!SchedulerError::transport("x").is_consistency_warning());

        assert!(SchedulerError::Internal("x".to_string()).is_fatal());
        assert!(SchedulerError::config_error("x").is_fatal());
        assert!(!SchedulerError::transport("x").is_fatal());
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: SchedulerError = json_err.into();
        assert!(matches!(error, SchedulerError::Serialization(_)));

        let anyhow_err = anyhow::anyhow!("boom");
        let error: SchedulerError = anyhow_err.into();
        assert_eq!(error.to_string(), "内部错误: boom");
    }
}
