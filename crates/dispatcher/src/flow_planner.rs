//! 流程规划
//!
//! 把作业（单任务或流程父作业加子作业）展开成执行计划。计划在触发时基于
//! 存储快照构造，之后对作业的修改不影响进行中的运行。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use jobflow_core::{
    codec::decode_command,
    models::{Agent, AgentId, Job, JobId, RunModel},
    traits::{AgentDirectory, JobStore},
    SchedulerError, SchedulerResult,
};

use crate::retry_policy::RetryPolicy;

/// 计划中的一个步骤
#[derive(Debug, Clone)]
pub struct ExecutionStep {
    /// 临时命令没有作业ID
    pub job_id: Option<JobId>,
    pub job_name: String,
    pub agent_id: AgentId,
    /// 执行器不存在或已删除时为 `None`，该步骤直接失败
    pub agent: Option<Agent>,
    /// 解码后的命令
    pub command: String,
    pub timeout: Option<Duration>,
    /// 首次执行加上重试次数
    pub max_attempts: u32,
    pub last_child: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// 运行守卫的键：单任务为自身，流程为父作业，临时命令为空
    pub job_id: Option<JobId>,
    pub job_name: String,
    pub run_model: RunModel,
    pub steps: Vec<ExecutionStep>,
    pub warning: bool,
    pub mobiles: Option<String>,
    pub email_address: Option<String>,
}

impl ExecutionPlan {
    /// 运行守卫租约
    ///
    /// 串行取各步骤之和，并行取最大值，再加上保留时间；任一步骤不限时或总时长溢出则不设租约。
    pub fn lease(&self, policy: &RetryPolicy) -> Option<Duration> {
        let budgets: Option<Vec<Duration>> = self
            .steps
            .iter()
            .map(|step| policy.step_budget(step.timeout, step.max_attempts))
            .collect();
        let budgets = budgets?;
        let total = match self.run_model {
            RunModel::Serial => budgets
                .into_iter()
                .try_fold(Duration::ZERO, |sum, budget| sum.checked_add(budget))?,
            RunModel::Parallel => budgets.into_iter().max().unwrap_or_default(),
        };
        total.checked_add(policy.lease_slack)
    }
}

/// 批量临时命令在某个执行器上的步骤名
pub fn batch_step_name(agent_id: AgentId) -> String {
    format!("batch@{agent_id}")
}

pub struct FlowPlanner {
    agents: Arc<dyn AgentDirectory>,
}

impl FlowPlanner {
    pub fn new(agents: Arc<dyn AgentDirectory>) -> Self {
        Self { agents }
    }

    /// 按作业当前状态规划：流程成员（父作业或子作业）规划整个流程
    pub async fn plan_for(&self, store: &dyn JobStore, job: &Job) -> SchedulerResult<ExecutionPlan> {
        if !job.is_flow() {
            return self.plan_single(job).await;
        }

        let flow_id = job.trigger_target();
        let parent = if job.is_flow_parent() {
            job.clone()
        } else {
            store
                .get_job(flow_id)
                .await?
                .ok_or(SchedulerError::JobNotFound { id: flow_id })?
        };
        let children = store.get_flow_children(flow_id).await?;
        self.plan(&parent, &children).await
    }

    /// 流程计划
    pub async fn plan(&self, parent: &Job, children: &[Job]) -> SchedulerResult<ExecutionPlan> {
        if children.is_empty() {
            return Err(SchedulerError::validation(format!(
                "流程作业 {} 没有子作业",
                parent.job_id
            )));
        }

        let mut ordered: Vec<&Job> = children.iter().collect();
        ordered.sort_by_key(|c| c.flow_num);
        let last_index = ordered.len() - 1;

        let mut steps = Vec::with_capacity(ordered.len());
        for (index, child) in ordered.into_iter().enumerate() {
            let mut step = self.step_for(child).await?;
            step.last_child = index == last_index;
            steps.push(step);
        }

        debug!(
            "流程作业 {} 规划完成: {:?}，共 {} 个步骤",
            parent.job_id,
            parent.run_model,
            steps.len()
        );

        Ok(ExecutionPlan {
            job_id: Some(parent.job_id),
            job_name: parent.job_name.clone(),
            run_model: parent.run_model,
            steps,
            warning: parent.warning,
            mobiles: parent.mobiles.clone(),
            email_address: parent.email_address.clone(),
        })
    }

    /// 单任务计划
    pub async fn plan_single(&self, job: &Job) -> SchedulerResult<ExecutionPlan> {
        let mut step = self.step_for(job).await?;
        step.last_child = true;

        Ok(ExecutionPlan {
            job_id: Some(job.job_id),
            job_name: job.job_name.clone(),
            run_model: RunModel::Serial,
            steps: vec![step],
            warning: job.warning,
            mobiles: job.mobiles.clone(),
            email_address: job.email_address.clone(),
        })
    }

    /// 批量临时命令中针对单个执行器的计划，命令为明文，不重试
    pub async fn plan_ad_hoc(&self, agent_id: AgentId, command: &str) -> SchedulerResult<ExecutionPlan> {
        if command.trim().is_empty() {
            return Err(SchedulerError::validation("命令不能为空"));
        }
        let agent = self.resolve_agent(agent_id).await?;
        let name = batch_step_name(agent_id);

        Ok(ExecutionPlan {
            job_id: None,
            job_name: name.clone(),
            run_model: RunModel::Serial,
            steps: vec![ExecutionStep {
                job_id: None,
                job_name: name,
                agent_id,
                agent,
                command: command.to_string(),
                timeout: None,
                max_attempts: 1,
                last_child: true,
            }],
            warning: false,
            mobiles: None,
            email_address: None,
        })
    }

    async fn step_for(&self, job: &Job) -> SchedulerResult<ExecutionStep> {
        let command = decode_command(&job.command)?;
        if command.trim().is_empty() {
            return Err(SchedulerError::validation(format!(
                "作业 {} 的命令为空",
                job.job_id
            )));
        }

        Ok(ExecutionStep {
            job_id: Some(job.job_id),
            job_name: job.job_name.clone(),
            agent_id: job.agent_id,
            agent: self.resolve_agent(job.agent_id).await?,
            command,
            timeout: job.timeout_seconds().map(Duration::from_secs),
            max_attempts: 1 + job.retry_budget(),
            last_child: false,
        })
    }

    async fn resolve_agent(&self, agent_id: AgentId) -> SchedulerResult<Option<Agent>> {
        Ok(self
            .agents
            .get_agent(agent_id)
            .await?
            .filter(|agent| !agent.deleted))
    }
}
