use async_trait::async_trait;

use crate::{
    models::{Agent, AgentId, DeleteCheck, Job, JobFilter, JobId, UserId},
    SchedulerResult,
};

/// 作业存储接口
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 根据ID获取作业（包括已删除的作业）
    async fn get_job(&self, id: JobId) -> SchedulerResult<Option<Job>>;

    /// 新建或覆盖单个作业，新建时分配ID
    async fn merge(&self, job: &Job) -> SchedulerResult<Job>;

    /// 保存流程父作业及其子作业
    ///
    /// 父作业的 `flow_id` 指向自身，子作业按传入顺序编号，原流程中不再出现的子作业被删除。
    async fn save_flow_job(&self, parent: &Job, children: &[Job]) -> SchedulerResult<(Job, Vec<Job>)>;

    /// 获取流程的全部未删除子作业，按序号排列
    async fn get_flow_children(&self, flow_id: JobId) -> SchedulerResult<Vec<Job>>;

    /// 同一执行器上是否已存在同名作业（排除 `job_id` 自身）
    async fn exists_name(&self, job_id: Option<JobId>, agent_id: AgentId, name: &str) -> SchedulerResult<bool>;

    /// 删除前检查
    async fn check_delete(&self, id: JobId) -> SchedulerResult<DeleteCheck>;

    /// 软删除作业，流程父作业连同子作业一起删除
    async fn delete(&self, id: JobId) -> SchedulerResult<()>;

    /// 物理删除已软删除的作业
    async fn purge(&self, id: JobId) -> SchedulerResult<()>;

    /// 按过滤条件列出作业
    async fn list_jobs(&self, filter: &JobFilter) -> SchedulerResult<Vec<Job>>;

    /// 所有应当拥有触发器的作业
    async fn get_scheduled_jobs(&self) -> SchedulerResult<Vec<Job>>;
}

/// 执行器目录接口
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, id: AgentId) -> SchedulerResult<Option<Agent>>;

    /// 用户可使用的未删除执行器
    async fn get_owner_agents(&self, user_id: UserId) -> SchedulerResult<Vec<Agent>>;
}
