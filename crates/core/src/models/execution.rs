use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AgentId, JobId, RunModel, UserId};
use crate::errors::DispatchError;

/// 触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    /// 定时器触发
    Schedule,
    /// 用户手动执行
    Operator { user_id: UserId },
    /// 批量临时命令
    Batch { user_id: UserId },
}

/// 发往执行器的执行请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub run_id: Uuid,
    /// 临时命令没有作业ID
    pub job_id: Option<JobId>,
    /// 解码后的命令
    pub command: String,
    pub timeout_seconds: Option<u64>,
}

/// 执行器返回的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub exit_code: i32,
    #[serde(default)]
    pub output: Option<String>,
}

impl ExecuteResponse {
    pub fn success(output: Option<String>) -> Self {
        Self {
            exit_code: 0,
            output,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// 单个步骤的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// 串行流程中前序步骤失败，本步骤未分发
    Skipped,
}

/// 单个步骤的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub job_id: Option<JobId>,
    pub job_name: String,
    pub agent_id: AgentId,
    pub status: StepStatus,
    /// 实际发出的请求次数
    pub attempts: u32,
    pub error: Option<DispatchError>,
    pub output: Option<String>,
    pub last_child: bool,
}

impl StepOutcome {
    pub fn skipped(job_id: Option<JobId>, job_name: String, agent_id: AgentId, last_child: bool) -> Self {
        Self {
            job_id,
            job_name,
            agent_id,
            status: StepStatus::Skipped,
            attempts: 0,
            error: None,
            output: None,
            last_child,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// 一次运行的整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// 一次运行的报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    /// 运行守卫使用的作业ID，临时命令为空
    pub job_id: Option<JobId>,
    pub run_model: RunModel,
    pub trigger: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    /// 整体成功当且仅当所有步骤成功
    pub fn status(&self) -> RunStatus {
        if !self.steps.is_empty() && self.steps.iter().all(StepOutcome::is_success) {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Succeeded
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
    }

    pub fn step_for_agent(&self, agent_id: AgentId) -> Option<&StepOutcome> {
        self.steps.iter().find(|step| step.agent_id == agent_id)
    }
}

/// 告警通知请求，实际投递由外部完成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub job_id: JobId,
    pub job_name: String,
    pub run_id: Uuid,
    pub mobiles: Option<String>,
    pub email_address: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(status: StepStatus, agent_id: AgentId) -> StepOutcome {
        StepOutcome {
            job_id: Some(1),
            job_name: "step".to_string(),
            agent_id,
            status,
            attempts: 1,
            error: None,
            output: None,
            last_child: false,
        }
    }

    #[test]
    fn test_run_report_status() {
        let mut report = RunReport {
            run_id: Uuid::new_v4(),
            job_id: Some(1),
            run_model: RunModel::Serial,
            trigger: TriggerSource::Schedule,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            steps: vec![step(StepStatus::Succeeded, 1), step(StepStatus::Succeeded, 2)],
        };
        assert!(report.is_success());

        report.steps.push(step(StepStatus::Skipped, 3));
        assert_eq!(report.status(), RunStatus::Failed);
        assert_eq!(report.failed_steps().count(), 0);
        assert_eq!(report.step_for_agent(3).map(|s| s.status), Some(StepStatus::Skipped));

        report.steps.clear();
        assert_eq!(report.status(), RunStatus::Failed);
    }
}
