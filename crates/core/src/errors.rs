use thiserror::Error;

use crate::models::{AgentId, JobId};

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("作业未找到: {id}")]
    JobNotFound { id: JobId },

    #[error("执行器未找到: {id}")]
    AgentNotFound { id: AgentId },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    /// 触发器同步失败，作业已持久化但定时器与之不一致，需要显式重新同步
    #[error("触发器同步失败: 作业 {job_id} - {message}")]
    Scheduling { job_id: JobId, message: String },

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("分发失败: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("命令编解码错误: {0}")]
    Codec(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn scheduling<S: Into<String>>(job_id: JobId, msg: S) -> Self {
        Self::Scheduling {
            job_id,
            message: msg.into(),
        }
    }

    pub fn is_scheduling_error(&self) -> bool {
        matches!(self, Self::Scheduling { .. } | Self::InvalidCron { .. })
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Codec(_))
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

/// 向执行器分发命令时的错误
///
/// 暂时性错误（执行器不可达、非零退出码、超时）受重试策略约束；
/// 致命错误（执行器未知、已删除或查询失败）立即终止，不消耗重试次数。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("执行器 {agent_id} 不可达: {message}")]
    Unreachable { agent_id: AgentId, message: String },

    #[error("执行器 {agent_id} 返回非零退出码: {exit_code}")]
    NonZeroExit { agent_id: AgentId, exit_code: i32 },

    #[error("执行器 {agent_id} 执行超时 ({timeout_seconds}秒)")]
    Timeout {
        agent_id: AgentId,
        timeout_seconds: u64,
    },

    #[error("执行器 {agent_id} 不存在或已删除")]
    UnknownAgent { agent_id: AgentId },

    /// 查询执行器目录失败，只出现在批量执行的单个目标上
    #[error("执行器 {agent_id} 查询失败: {message}")]
    AgentLookup { agent_id: AgentId, message: String },

    #[error("作业 {job_id} 正在运行，拒绝重复执行")]
    AlreadyRunning { job_id: JobId },
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Unreachable { .. }
                | DispatchError::NonZeroExit { .. }
                | DispatchError::Timeout { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_classification() {
        assert!(DispatchError::Unreachable {
            agent_id: 1,
            message: "connection refused".to_string()
        }
        .is_retryable());
        assert!(DispatchError::NonZeroExit {
            agent_id: 1,
            exit_code: 2
        }
        .is_retryable());
        assert!(DispatchError::Timeout {
            agent_id: 1,
            timeout_seconds: 5
        }
        .is_retryable());
        assert!(DispatchError::UnknownAgent { agent_id: 9 }.is_fatal());
        assert!(DispatchError::AlreadyRunning { job_id: 3 }.is_fatal());
        assert!(DispatchError::AgentLookup {
            agent_id: 4,
            message: "down".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_scheduling_error_kind() {
        let err = SchedulerError::scheduling(7, "bad cron");
        assert!(err.is_scheduling_error());
        assert!(!err.is_validation_error());
        assert!(err.to_string().contains('7'));

        let err: SchedulerError = DispatchError::UnknownAgent { agent_id: 1 }.into();
        assert!(matches!(err, SchedulerError::Dispatch(_)));
    }
}
