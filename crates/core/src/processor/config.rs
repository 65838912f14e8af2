//! Queue processor configuration.

use crate::config::QueueConfig;
use crate::queue::RetryPolicy;

/// Configuration for the queue processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Retry policy for recoverable failures.
    pub retry: RetryPolicy,

    /// Keep the run alive until scheduled retries are due.
    /// When disabled, the run ends as soon as nothing is claimable and
    /// pending retries are left for the next run.
    pub wait_for_retries: bool,
}

impl ProcessorConfig {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            wait_for_retries: config.wait_for_retries,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ProcessorConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.retry_delay, Duration::from_secs(60));
        assert!(config.wait_for_retries);
    }

    #[test]
    fn test_from_queue_config() {
        let toml = r#"
            max_attempts = 5
            retry_delay_secs = 10
            wait_for_retries = false
        "#;
        let queue: QueueConfig = toml::from_str(toml).unwrap();
        let config = ProcessorConfig::from_config(&queue);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retry_delay, Duration::from_secs(10));
        assert!(!config.wait_for_retries);
    }
}
