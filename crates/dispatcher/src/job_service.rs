//! 作业服务
//!
//! 面向用户的作业操作。每个操作显式接收调用者身份，所有权或参数不满足时
//! 返回 [`Outcome`]，只有存储故障、触发器同步失败和分发拒绝以错误返回。
//! 修改类操作先落库，再同步触发器；删除先移除触发器，再标记删除。

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use jobflow_core::{
    codec::{decode_command, encode_command},
    models::{
        Agent, AgentId, CallerIdentity, ChildJobSpec, DeleteCheck,
        Job, JobEdit, JobFilter, JobForm, JobId, JobType, JobView, Outcome, Page,
        PageRequest, TriggerSource,
    },
    traits::{AgentDirectory, JobStore},
    SchedulerResult,
};

use crate::execute_service::{DispatchHandle, ExecuteService};
use crate::ownership::{can_use_agent, check_owner};
use crate::run_guard::RunGuard;
use crate::trigger_scheduler::TriggerScheduler;

pub struct JobService {
    job_store: Arc<dyn JobStore>,
    agents: Arc<dyn AgentDirectory>,
    triggers: Arc<TriggerScheduler>,
    executor: ExecuteService,
    run_guard: Arc<RunGuard>,
}

impl JobService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        agents: Arc<dyn AgentDirectory>,
        triggers: Arc<TriggerScheduler>,
        executor: ExecuteService,
    ) -> Self {
        let run_guard = Arc::clone(executor.run_guard());
        Self {
            job_store,
            agents,
            triggers,
            executor,
            run_guard,
        }
    }

    /// 作业列表：单任务与流程父作业，最近修改的在前
    ///
    /// 非管理员只能看到自己的作业。
    pub async fn list_jobs(
        &self,
        caller: &CallerIdentity,
        mut filter: JobFilter,
        page: PageRequest,
    ) -> SchedulerResult<Page<Job>> {
        filter.include_deleted = false;
        if !caller.admin {
            filter.user_id = Some(caller.user_id);
        }
        let jobs: Vec<Job> = self
            .job_store
            .list_jobs(&filter)
            .await?
            .into_iter()
            .filter(|job| !job.is_flow_child())
            .collect();
        Ok(Page::slice(jobs, page))
    }

    /// 名称在该执行器上可用时返回 `true`
    pub async fn check_name(&self, job_id: Option<JobId>, agent_id: AgentId, name: &str) -> SchedulerResult<bool> {
        Ok(!self.job_store.exists_name(job_id, agent_id, name).await?)
    }

    pub async fn check_delete(&self, id: JobId) -> SchedulerResult<DeleteCheck> {
        let verdict = self.job_store.check_delete(id).await?;
        if verdict.is_ok() && self.run_guard.is_running(self.guard_key(id).await?) {
            return Ok(DeleteCheck::Rejected("作业正在运行".to_string()));
        }
        Ok(verdict)
    }

    /// 软删除，先移除触发器
    pub async fn delete(&self, caller: &CallerIdentity, id: JobId) -> SchedulerResult<Outcome<()>> {
        let job = match self.active_job(id).await? {
            Some(job) => job,
            None => return Ok(Outcome::NotFound),
        };
        if !check_owner(caller, &job) {
            return Ok(Outcome::NotOwner);
        }
        if job.is_flow_child() {
            return Ok(Outcome::invalid("流程子作业不能单独删除"));
        }

        {
            let _sync = self.triggers.sync_guard().await;
            self.triggers.remove_trigger(id);
            self.job_store.delete(id).await?;
        }
        info!("用户 {} 删除作业 {} ({})", caller.user_id, id, job.job_name);
        Ok(Outcome::Applied(()))
    }

    /// 物理删除已软删除的作业
    pub async fn purge(&self, caller: &CallerIdentity, id: JobId) -> SchedulerResult<Outcome<()>> {
        let Some(job) = self.job_store.get_job(id).await? else {
            return Ok(Outcome::NotFound);
        };
        if !check_owner(caller, &job) {
            return Ok(Outcome::NotOwner);
        }
        if !job.deleted {
            return Ok(Outcome::invalid("只能清除已删除的作业"));
        }

        self.job_store.purge(id).await?;
        info!("用户 {} 清除作业 {}", caller.user_id, id);
        Ok(Outcome::Applied(()))
    }

    /// 新建或修改作业，保存后同步触发器
    pub async fn save(&self, caller: &CallerIdentity, form: JobForm) -> SchedulerResult<Outcome<Job>> {
        let mut job = match form.job_id {
            Some(id) => {
                let Some(existing) = self.active_job(id).await? else {
                    return Ok(Outcome::NotFound);
                };
                if !check_owner(caller, &existing) {
                    return Ok(Outcome::NotOwner);
                }
                if existing.is_flow_child() {
                    return Ok(Outcome::invalid("流程子作业只能随流程一起保存"));
                }
                if existing.job_type != form.job_type {
                    return Ok(Outcome::invalid("不能修改作业类型"));
                }
                existing
            }
            None => Job::new(String::new(), form.agent_id, String::new(), caller.user_id),
        };

        if let Err(reason) = validate_basics(&form.job_name, form.timeout) {
            return Ok(Outcome::Invalid(reason));
        }

        job.job_name = form.job_name.trim().to_string();
        job.job_type = form.job_type;
        job.exec_type = form.exec_type;
        job.run_model = form.run_model;
        job.cron_type = form.cron_type;
        job.cron_exp = form.cron_exp.clone();
        job.timeout = form.timeout;
        if let Err(reason) = job.apply_retry_settings(form.redo, form.run_count) {
            return Ok(Outcome::Invalid(reason));
        }
        job.warning = form.warning;
        job.mobiles = if form.warning { form.mobiles.clone() } else { None };
        job.email_address = if form.warning { form.email_address.clone() } else { None };
        if job.warning && !job.has_warning_recipients() {
            return Ok(Outcome::invalid(MISSING_RECIPIENTS));
        }
        job.comment = form.comment.clone();
        job.update_time = Utc::now();

        let saved = match form.job_type {
            JobType::Singleton => {
                if form.command.trim().is_empty() {
                    return Ok(Outcome::invalid("命令不能为空"));
                }
                job.agent_id = form.agent_id;
                job.command = encode_command(&form.command);
                if let Some(rejection) = self.check_placement(caller, &job).await? {
                    return Ok(rejection);
                }
                self.job_store.merge(&job).await?
            }
            JobType::Flow => {
                if form.children.is_empty() {
                    return Ok(Outcome::invalid("流程作业必须至少包含一个子作业"));
                }
                job.agent_id = form.children[0].agent_id;
                job.command = String::new();
                if let Some(rejection) = self.check_placement(caller, &job).await? {
                    return Ok(rejection);
                }
                let children = match self.build_children(caller, &job, &form.children).await? {
                    Ok(children) => children,
                    Err(rejection) => return Ok(rejection),
                };
                let (parent, _) = self.job_store.save_flow_job(&job, &children).await?;
                parent
            }
        };

        info!("用户 {} 保存作业 {} ({})", caller.user_id, saved.job_id, saved.job_name);
        self.triggers.sync_trigger(saved.job_id).await?;
        Ok(Outcome::Applied(saved))
    }

    /// 执行器可用且名称不冲突时返回 `None`
    async fn check_placement(&self, caller: &CallerIdentity, job: &Job) -> SchedulerResult<Option<Outcome<Job>>> {
        if let Some(reason) = self.agent_rejection(caller, job.agent_id).await? {
            return Ok(Some(Outcome::Invalid(reason)));
        }
        let existing_id = (job.job_id != 0).then_some(job.job_id);
        if self.job_store.exists_name(existing_id, job.agent_id, &job.job_name).await? {
            return Ok(Some(Outcome::invalid(format!(
                "执行器 {} 上已存在同名作业: {}",
                job.agent_id, job.job_name
            ))));
        }
        Ok(None)
    }

    async fn agent_rejection(&self, caller: &CallerIdentity, agent_id: AgentId) -> SchedulerResult<Option<String>> {
        Ok(match self.agents.get_agent(agent_id).await? {
            None => Some(format!("执行器 {agent_id} 不存在")),
            Some(agent) if !can_use_agent(caller, &agent) => {
                Some(format!("执行器 {agent_id} 已删除或无权使用"))
            }
            Some(_) => None,
        })
    }

    async fn build_children(
        &self,
        caller: &CallerIdentity,
        parent: &Job,
        specs: &[ChildJobSpec],
    ) -> SchedulerResult<Result<Vec<Job>, Outcome<Job>>> {
        let mut children = Vec::with_capacity(specs.len());
        for spec in specs {
            if let Err(reason) = validate_basics(&spec.job_name, spec.timeout) {
                return Ok(Err(Outcome::Invalid(reason)));
            }
            if spec.command.trim().is_empty() {
                return Ok(Err(Outcome::invalid(format!("子作业 {} 的命令不能为空", spec.job_name))));
            }
            if let Some(reason) = self.agent_rejection(caller, spec.agent_id).await? {
                return Ok(Err(Outcome::Invalid(reason)));
            }

            let mut child = match spec.job_id {
                Some(child_id) => {
                    let existing = self.job_store.get_job(child_id).await?;
                    match existing {
                        Some(existing)
                            if parent.job_id != 0
                                && existing.is_flow_child()
                                && existing.flow_id == Some(parent.job_id) =>
                        {
                            existing
                        }
                        _ => {
                            return Ok(Err(Outcome::invalid(format!(
                                "子作业 {child_id} 不属于该流程"
                            ))))
                        }
                    }
                }
                None => Job::new(String::new(), spec.agent_id, String::new(), parent.user_id),
            };

            child.job_name = spec.job_name.trim().to_string();
            child.job_type = JobType::Flow;
            child.agent_id = spec.agent_id;
            child.command = encode_command(&spec.command);
            child.timeout = spec.timeout;
            if let Err(reason) = child.apply_retry_settings(spec.redo, spec.run_count) {
                return Ok(Err(Outcome::invalid(format!("子作业 {}: {}", spec.job_name, reason))));
            }
            child.comment = spec.comment.clone();
            child.cron_type = None;
            child.cron_exp = None;
            child.update_time = parent.update_time;
            children.push(child);
        }
        Ok(Ok(children))
    }

    /// 作业详情，流程父作业附带子作业
    pub async fn job_detail(&self, caller: &CallerIdentity, id: JobId) -> SchedulerResult<Outcome<JobView>> {
        let Some(job) = self.job_store.get_job(id).await? else {
            return Ok(Outcome::NotFound);
        };
        if !check_owner(caller, &job) {
            return Ok(Outcome::NotOwner);
        }

        let agent = self.agents.get_agent(job.agent_id).await?;
        let command = decode_command(&job.command).ok().filter(|c| !c.is_empty());
        let children = if job.is_flow_parent() {
            self.job_store.get_flow_children(job.job_id).await?
        } else {
            Vec::new()
        };
        let running = self.run_guard.is_running(job.trigger_target());

        Ok(Outcome::Applied(JobView {
            job,
            agent,
            command,
            children,
            running,
        }))
    }

    /// 修改单个作业的属性并同步触发器
    ///
    /// 流程子作业没有自己的调度设置，执行方式与CRON字段被忽略。
    pub async fn edit(&self, caller: &CallerIdentity, id: JobId, edit: JobEdit) -> SchedulerResult<Outcome<Job>> {
        let Some(mut job) = self.active_job(id).await? else {
            return Ok(Outcome::NotFound);
        };
        if !check_owner(caller, &job) {
            return Ok(Outcome::NotOwner);
        }

        if let Err(reason) = validate_basics(&edit.job_name, edit.timeout) {
            return Ok(Outcome::Invalid(reason));
        }
        if edit.command.trim().is_empty() && !job.is_flow_parent() {
            return Ok(Outcome::invalid("命令不能为空"));
        }

        let name = edit.job_name.trim();
        if self.job_store.exists_name(Some(id), job.agent_id, name).await? {
            return Ok(Outcome::invalid(format!(
                "执行器 {} 上已存在同名作业: {}",
                job.agent_id, name
            )));
        }

        job.job_name = name.to_string();
        if !job.is_flow_child() {
            job.exec_type = edit.exec_type;
            job.cron_type = edit.cron_type;
            job.cron_exp = edit.cron_exp;
        }
        if !edit.command.trim().is_empty() {
            job.command = encode_command(&edit.command);
        }
        job.timeout = edit.timeout;
        if let Err(reason) = job.apply_retry_settings(edit.redo, edit.run_count) {
            return Ok(Outcome::Invalid(reason));
        }
        job.warning = edit.warning;
        if edit.warning {
            job.mobiles = edit.mobiles;
            job.email_address = edit.email_address;
        }
        if job.warning && !job.has_warning_recipients() {
            return Ok(Outcome::invalid(MISSING_RECIPIENTS));
        }
        job.comment = edit.comment;
        job.update_time = Utc::now();

        let saved = self.job_store.merge(&job).await?;
        self.triggers.sync_trigger(saved.trigger_target()).await?;
        Ok(Outcome::Applied(saved))
    }

    /// 只修改命令，流程成员同步父作业的触发器
    pub async fn edit_command(&self, caller: &CallerIdentity, id: JobId, command: &str) -> SchedulerResult<Outcome<Job>> {
        let Some(mut job) = self.active_job(id).await? else {
            return Ok(Outcome::NotFound);
        };
        if !check_owner(caller, &job) {
            return Ok(Outcome::NotOwner);
        }
        if command.trim().is_empty() {
            return Ok(Outcome::invalid("命令不能为空"));
        }

        job.command = encode_command(command);
        job.update_time = Utc::now();
        let saved = self.job_store.merge(&job).await?;
        self.triggers.sync_trigger(saved.trigger_target()).await?;
        Ok(Outcome::Applied(saved))
    }

    /// 流程成员按整个流程判断是否在运行
    pub async fn is_running(&self, id: JobId) -> SchedulerResult<bool> {
        Ok(self.run_guard.is_running(self.guard_key(id).await?))
    }

    /// 人工执行，流程成员执行整个流程
    ///
    /// 作业已在运行时返回 `DispatchError::AlreadyRunning`。
    pub async fn execute(&self, caller: &CallerIdentity, id: JobId) -> SchedulerResult<Outcome<DispatchHandle>> {
        let Some(job) = self.active_job(id).await? else {
            return Ok(Outcome::NotFound);
        };
        if !check_owner(caller, &job) {
            return Ok(Outcome::NotOwner);
        }

        info!("用户 {} 手动执行作业 {}", caller.user_id, id);
        let handle = self
            .executor
            .execute_job(&job, TriggerSource::Operator { user_id: caller.user_id })
            .await?;
        Ok(Outcome::Applied(handle))
    }

    /// 调用者可以使用的执行器
    pub async fn owner_agents(&self, caller: &CallerIdentity) -> SchedulerResult<Vec<Agent>> {
        self.agents.get_owner_agents(caller.user_id).await
    }

    /// 在多个执行器上执行同一条临时命令
    ///
    /// 不存在的执行器在各自的报告中失败；存在但调用者无权使用的执行器使整批被拒绝。
    pub async fn batch_execute(
        &self,
        caller: &CallerIdentity,
        command: &str,
        agent_ids: &[AgentId],
    ) -> SchedulerResult<Outcome<Vec<DispatchHandle>>> {
        if command.trim().is_empty() {
            return Ok(Outcome::invalid("命令不能为空"));
        }
        if agent_ids.is_empty() {
            return Ok(Outcome::invalid("至少选择一个执行器"));
        }
        for agent_id in agent_ids {
            if let Some(agent) = self.agents.get_agent(*agent_id).await? {
                if !agent.deleted && !can_use_agent(caller, &agent) {
                    return Ok(Outcome::NotOwner);
                }
            }
        }

        info!(
            "用户 {} 批量执行命令，执行器: {:?}",
            caller.user_id, agent_ids
        );
        let handles = self
            .executor
            .batch_execute_job(caller.user_id, command, agent_ids)
            .await?;
        Ok(Outcome::Applied(handles))
    }

    /// 运行守卫的键，作业不存在时按原ID查询
    async fn guard_key(&self, id: JobId) -> SchedulerResult<JobId> {
        Ok(self
            .job_store
            .get_job(id)
            .await?
            .map_or(id, |job| job.trigger_target()))
    }

    async fn active_job(&self, id: JobId) -> SchedulerResult<Option<Job>> {
        Ok(self.job_store.get_job(id).await?.filter(|job| !job.deleted))
    }
}

const MISSING_RECIPIENTS: &str = "开启告警时必须填写手机号或邮箱";

fn validate_basics(name: &str, timeout: i32) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("作业名称不能为空".to_string());
    }
    if timeout < 0 {
        return Err(format!("超时时间不能为负数: {timeout}"));
    }
    Ok(())
}
