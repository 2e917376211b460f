use std::time::Duration;

use jobflow_core::{config::DispatcherConfig, errors::DispatchError};

/// 步骤重试策略
///
/// 每个步骤有独立的尝试次数；暂时性错误在间隔之后重试，致命错误立即终止。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 两次尝试之间的等待时间
    pub interval: Duration,
    /// 运行守卫租约的额外保留时间
    pub lease_slack: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatcherConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.retry_interval_ms),
            lease_slack: Duration::from_secs(config.guard_lease_slack_seconds),
        }
    }

    /// 第 `attempt` 次尝试（从1开始）失败后是否继续
    pub fn should_retry(&self, error: &DispatchError, attempt: u32, max_attempts: u32) -> bool {
        error.is_retryable() && attempt < max_attempts
    }

    /// 单个步骤最长可能占用的时间，步骤不限时或时长溢出时返回 `None`
    pub fn step_budget(&self, timeout: Option<Duration>, max_attempts: u32) -> Option<Duration> {
        let timeout = timeout?;
        let attempts = max_attempts.max(1);
        timeout
            .checked_mul(attempts)?
            .checked_add(self.interval.checked_mul(attempts - 1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        let transient = DispatchError::NonZeroExit {
            agent_id: 1,
            exit_code: 1,
        };
        let fatal = DispatchError::UnknownAgent { agent_id: 1 };

        assert!(policy.should_retry(&transient, 1, 3));
        assert!(policy.should_retry(&transient, 2, 3));
        assert!(!policy.should_retry(&transient, 3, 3));
        assert!(!policy.should_retry(&fatal, 1, 3));
    }

    #[test]
    fn test_step_budget() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(1),
            lease_slack: Duration::from_secs(30),
        };
        assert_eq!(
            policy.step_budget(Some(Duration::from_secs(10)), 3),
            Some(Duration::from_secs(32))
        );
        assert_eq!(policy.step_budget(None, 3), None);
    }

    #[test]
    fn test_step_budget_overflow_means_unbounded() {
        let policy = RetryPolicy::default();
        let timeout = Some(Duration::from_secs(u64::MAX / 2));

        assert_eq!(policy.step_budget(timeout, 3), None);
        assert_eq!(policy.step_budget(Some(Duration::MAX), 2), None);
        assert!(policy.step_budget(timeout, 1).is_some());
    }
}
