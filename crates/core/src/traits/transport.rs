use async_trait::async_trait;

use crate::{
    errors::DispatchError,
    models::{Agent, ExecuteRequest, ExecuteResponse, FailureNotice},
    SchedulerResult,
};

/// 执行器传输接口
///
/// 只负责把命令送到执行器并取回结果；超时与重试由分发器控制。
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn execute(
        &self,
        agent: &Agent,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, DispatchError>;
}

/// 告警通知接口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &FailureNotice) -> SchedulerResult<()>;
}
