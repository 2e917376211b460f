//! 执行分发
//!
//! 把执行计划发送到执行器。作业运行先在 [`RunGuard`] 占位，占位失败即拒绝；
//! 串行流程逐步推进，前序步骤最终失败时后续步骤不再分发；并行流程同时分发。
//! 所有运行都在后台任务中进行，调用方通过 [`DispatchHandle`] 等待结果。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

use jobflow_core::{
    errors::DispatchError,
    models::{
        AgentId, ExecType, ExecuteRequest, FailureNotice, Job, JobId, RunModel, RunReport,
        StepOutcome, StepStatus, TriggerSource, UserId,
    },
    traits::{AgentTransport, JobStore, Notifier},
    SchedulerError, SchedulerResult,
};
use jobflow_infrastructure::{MetricsCollector, StructuredLogger};

use crate::flow_planner::{batch_step_name, ExecutionPlan, ExecutionStep, FlowPlanner};
use crate::retry_policy::RetryPolicy;
use crate::run_guard::{RunGuard, RunPermit};
use crate::trigger_scheduler::TriggerHandler;

/// 一次运行的句柄
#[derive(Debug)]
pub struct DispatchHandle {
    run_id: Uuid,
    job_id: Option<JobId>,
    receiver: oneshot::Receiver<RunReport>,
}

impl DispatchHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    /// 等待运行结束
    pub async fn wait(self) -> SchedulerResult<RunReport> {
        self.receiver
            .await
            .map_err(|_| SchedulerError::Internal(format!("运行 {} 的结果通道已关闭", self.run_id)))
    }

    pub async fn wait_all(handles: Vec<DispatchHandle>) -> Vec<SchedulerResult<RunReport>> {
        join_all(handles.into_iter().map(DispatchHandle::wait)).await
    }
}

#[derive(Clone)]
pub struct ExecuteService {
    job_store: Arc<dyn JobStore>,
    planner: Arc<FlowPlanner>,
    transport: Arc<dyn AgentTransport>,
    notifier: Arc<dyn Notifier>,
    run_guard: Arc<RunGuard>,
    metrics: Arc<MetricsCollector>,
    retry_policy: RetryPolicy,
}

impl ExecuteService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        planner: Arc<FlowPlanner>,
        transport: Arc<dyn AgentTransport>,
        notifier: Arc<dyn Notifier>,
        run_guard: Arc<RunGuard>,
        metrics: Arc<MetricsCollector>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            job_store,
            planner,
            transport,
            notifier,
            run_guard,
            metrics,
            retry_policy,
        }
    }

    pub fn run_guard(&self) -> &Arc<RunGuard> {
        &self.run_guard
    }

    /// 执行作业
    ///
    /// 流程成员执行整个流程，运行守卫以流程父作业为键。同一作业已在运行时
    /// 返回 [`DispatchError::AlreadyRunning`]。
    pub async fn execute_job(&self, job: &Job, trigger: TriggerSource) -> SchedulerResult<DispatchHandle> {
        let plan = self.planner.plan_for(self.job_store.as_ref(), job).await?;
        let guard_key = plan.job_id.unwrap_or_else(|| job.trigger_target());

        let Some(permit) = self.run_guard.try_claim(guard_key, plan.lease(&self.retry_policy)) else {
            StructuredLogger::log_run_rejected(guard_key);
            self.metrics.record_guard_rejection();
            return Err(DispatchError::AlreadyRunning { job_id: guard_key }.into());
        };

        Ok(self.spawn_run(plan, trigger, Some(permit)))
    }

    /// 对多个执行器分别执行同一条临时命令，各执行器的失败互不影响
    ///
    /// 每个目标都返回一个句柄。某个执行器查询失败时，该目标得到一份失败报告，
    /// 其余目标照常分发。
    pub async fn batch_execute_job(
        &self,
        user_id: UserId,
        command: &str,
        agent_ids: &[AgentId],
    ) -> SchedulerResult<Vec<DispatchHandle>> {
        if command.trim().is_empty() {
            return Err(SchedulerError::validation("命令不能为空"));
        }

        let trigger = TriggerSource::Batch { user_id };
        let mut handles = Vec::with_capacity(agent_ids.len());
        for &agent_id in agent_ids {
            let handle = match self.planner.plan_ad_hoc(agent_id, command).await {
                Ok(plan) => self.spawn_run(plan, trigger, None),
                Err(e) => {
                    warn!("批量执行时执行器 {} 规划失败: {}", agent_id, e);
                    let error = DispatchError::AgentLookup {
                        agent_id,
                        message: e.to_string(),
                    };
                    self.failed_run(agent_id, trigger, error)
                }
            };
            handles.push(handle);
        }
        Ok(handles)
    }

    /// 没有进入分发的批量目标，直接回传失败报告
    fn failed_run(&self, agent_id: AgentId, trigger: TriggerSource, error: DispatchError) -> DispatchHandle {
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        let job_name = batch_step_name(agent_id);
        StructuredLogger::log_step_attempt_failed(run_id, &job_name, agent_id, 0, 1, &error);

        let report = RunReport {
            run_id,
            job_id: None,
            run_model: RunModel::Serial,
            trigger,
            started_at: now,
            finished_at: now,
            steps: vec![StepOutcome {
                job_id: None,
                job_name,
                agent_id,
                status: StepStatus::Failed,
                attempts: 0,
                error: Some(error),
                output: None,
                last_child: true,
            }],
        };
        self.metrics.record_run(false, 0.0);

        let (sender, receiver) = oneshot::channel();
        if sender.send(report).is_err() {
            debug!("运行 {} 的句柄已丢弃，结果不再回传", run_id);
        }
        DispatchHandle {
            run_id,
            job_id: None,
            receiver,
        }
    }

    fn spawn_run(&self, plan: ExecutionPlan, trigger: TriggerSource, permit: Option<RunPermit>) -> DispatchHandle {
        let run_id = Uuid::new_v4();
        let job_id = plan.job_id;
        let (sender, receiver) = oneshot::channel();
        let service = self.clone();

        tokio::spawn(async move {
            let report = service.run_plan(run_id, &plan, trigger).await;
            drop(permit);
            service.notify_on_failure(&plan, &report).await;
            if sender.send(report).is_err() {
                debug!("运行 {} 的句柄已丢弃，结果不再回传", run_id);
            }
        });

        DispatchHandle {
            run_id,
            job_id,
            receiver,
        }
    }

    async fn run_plan(&self, run_id: Uuid, plan: &ExecutionPlan, trigger: TriggerSource) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        StructuredLogger::log_dispatch_started(run_id, plan.job_id, plan.run_model, &trigger, plan.steps.len());

        let steps = match plan.run_model {
            RunModel::Serial => self.run_serial(run_id, &plan.steps).await,
            RunModel::Parallel => {
                join_all(plan.steps.iter().map(|step| self.run_step(run_id, step))).await
            }
        };

        let report = RunReport {
            run_id,
            job_id: plan.job_id,
            run_model: plan.run_model,
            trigger,
            started_at,
            finished_at: Utc::now(),
            steps,
        };

        let elapsed = clock.elapsed();
        self.metrics.record_run(report.is_success(), elapsed.as_secs_f64());
        StructuredLogger::log_dispatch_completed(run_id, plan.job_id, report.is_success(), elapsed.as_millis() as i64);
        report
    }

    async fn run_serial(&self, run_id: Uuid, steps: &[ExecutionStep]) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(steps.len());
        let mut failed = false;
        for step in steps {
            if failed {
                StructuredLogger::log_step_skipped(run_id, &step.job_name, step.agent_id);
                outcomes.push(StepOutcome::skipped(
                    step.job_id,
                    step.job_name.clone(),
                    step.agent_id,
                    step.last_child,
                ));
                continue;
            }
            let outcome = self.run_step(run_id, step).await;
            failed = !outcome.is_success();
            outcomes.push(outcome);
        }
        outcomes
    }

    /// 执行单个步骤，按重试策略重复直到成功或次数用尽
    async fn run_step(&self, run_id: Uuid, step: &ExecutionStep) -> StepOutcome {
        let clock = Instant::now();
        let mut outcome = StepOutcome {
            job_id: step.job_id,
            job_name: step.job_name.clone(),
            agent_id: step.agent_id,
            status: StepStatus::Failed,
            attempts: 0,
            error: None,
            output: None,
            last_child: step.last_child,
        };

        let Some(agent) = step.agent.as_ref() else {
            let error = DispatchError::UnknownAgent {
                agent_id: step.agent_id,
            };
            StructuredLogger::log_step_attempt_failed(run_id, &step.job_name, step.agent_id, 0, step.max_attempts, &error);
            outcome.error = Some(error);
            return outcome;
        };

        let request = ExecuteRequest {
            run_id,
            job_id: step.job_id,
            command: step.command.clone(),
            timeout_seconds: step.timeout.map(|t| t.as_secs()),
        };

        for attempt in 1..=step.max_attempts {
            outcome.attempts = attempt;
            let result = match step.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.transport.execute(agent, &request))
                    .await
                    .unwrap_or(Err(DispatchError::Timeout {
                        agent_id: agent.agent_id,
                        timeout_seconds: timeout.as_secs(),
                    })),
                None => self.transport.execute(agent, &request).await,
            };

            let error = match result {
                Ok(response) if response.is_success() => {
                    outcome.status = StepStatus::Succeeded;
                    outcome.output = response.output;
                    outcome.error = None;
                    break;
                }
                Ok(response) => {
                    outcome.output = response.output;
                    DispatchError::NonZeroExit {
                        agent_id: agent.agent_id,
                        exit_code: response.exit_code,
                    }
                }
                Err(e) => e,
            };

            StructuredLogger::log_step_attempt_failed(
                run_id,
                &step.job_name,
                agent.agent_id,
                attempt,
                step.max_attempts,
                &error,
            );
            let retry = self.retry_policy.should_retry(&error, attempt, step.max_attempts);
            outcome.error = Some(error);
            if !retry {
                break;
            }
            self.metrics.record_retry();
            tokio::time::sleep(self.retry_policy.interval).await;
        }

        self.metrics.record_step(clock.elapsed().as_secs_f64());
        outcome
    }

    async fn notify_on_failure(&self, plan: &ExecutionPlan, report: &RunReport) {
        let Some(job_id) = plan.job_id else {
            return;
        };
        if report.is_success() || !plan.warning {
            return;
        }

        let failed: Vec<String> = report
            .failed_steps()
            .map(|step| match &step.error {
                Some(error) => format!("{}: {}", step.job_name, error),
                None => step.job_name.clone(),
            })
            .collect();
        let notice = FailureNotice {
            job_id,
            job_name: plan.job_name.clone(),
            run_id: report.run_id,
            mobiles: plan.mobiles.clone(),
            email_address: plan.email_address.clone(),
            message: format!("作业 [{}] 执行失败: {}", plan.job_name, failed.join("; ")),
        };

        match self.notifier.notify(&notice).await {
            Ok(()) => StructuredLogger::log_notification_sent(job_id, report.run_id),
            Err(e) => error!("作业 {} 发送失败告警出错: {}", job_id, e),
        }
    }
}

#[async_trait]
impl TriggerHandler for ExecuteService {
    /// 定时触发：重新读取作业快照，已删除或不再是定时作业的跳过
    async fn on_fire(&self, job_id: JobId, scheduled_at: DateTime<Utc>) {
        let job = match self.job_store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("触发的作业 {} 不存在，跳过", job_id);
                return;
            }
            Err(e) => {
                error!("读取作业 {} 失败: {}", job_id, e);
                return;
            }
        };
        if job.deleted || job.exec_type != ExecType::Schedule {
            debug!("作业 {} 已删除或不是定时作业，跳过本次触发", job_id);
            return;
        }

        match self.execute_job(&job, TriggerSource::Schedule).await {
            Ok(handle) => debug!(
                "作业 {} 按计划时间 {} 开始运行 {}",
                job_id,
                scheduled_at,
                handle.run_id()
            ),
            Err(SchedulerError::Dispatch(DispatchError::AlreadyRunning { .. })) => {
                debug!("作业 {} 上一次运行尚未结束，跳过本次触发", job_id);
            }
            Err(e) => error!("作业 {} 定时执行失败: {}", job_id, e),
        }
    }
}
