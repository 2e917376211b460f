//! Structured logging utilities
//!
//! 调度与分发过程中的关键事件统一在这里输出，字段名保持稳定，方便日志检索。

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use jobflow_core::{
    errors::DispatchError,
    models::{AgentId, JobId, RunModel, TriggerSource},
};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_trigger_synced(job_id: JobId, cron_exp: &str, next_fire: Option<DateTime<Utc>>) {
        info!(
            event = "trigger_synced",
            job.id = job_id,
            trigger.cron = cron_exp,
            trigger.next_fire = ?next_fire,
            "触发器已同步"
        );
    }

    pub fn log_trigger_removed(job_id: JobId) {
        info!(event = "trigger_removed", job.id = job_id, "触发器已移除");
    }

    pub fn log_trigger_fired(job_id: JobId, scheduled_at: DateTime<Utc>) {
        info!(
            event = "trigger_fired",
            job.id = job_id,
            trigger.scheduled_at = %scheduled_at,
            "触发器到期，开始执行作业"
        );
    }

    pub fn log_dispatch_started(
        run_id: Uuid,
        job_id: Option<JobId>,
        run_model: RunModel,
        trigger: &TriggerSource,
        steps: usize,
    ) {
        info!(
            event = "dispatch_started",
            run.id = %run_id,
            job.id = ?job_id,
            run.model = ?run_model,
            run.trigger = ?trigger,
            run.steps = steps,
            "开始分发作业"
        );
    }

    pub fn log_dispatch_completed(run_id: Uuid, job_id: Option<JobId>, success: bool, duration_ms: i64) {
        if success {
            info!(
                event = "dispatch_completed",
                run.id = %run_id,
                job.id = ?job_id,
                run.duration_ms = duration_ms,
                "作业执行成功"
            );
        } else {
            warn!(
                event = "dispatch_failed",
                run.id = %run_id,
                job.id = ?job_id,
                run.duration_ms = duration_ms,
                "作业执行失败"
            );
        }
    }

    pub fn log_step_attempt_failed(
        run_id: Uuid,
        job_name: &str,
        agent_id: AgentId,
        attempt: u32,
        max_attempts: u32,
        error: &DispatchError,
    ) {
        warn!(
            event = "step_attempt_failed",
            run.id = %run_id,
            step.name = job_name,
            agent.id = agent_id,
            step.attempt = attempt,
            step.max_attempts = max_attempts,
            error = %error,
            "步骤执行失败"
        );
    }

    pub fn log_step_skipped(run_id: Uuid, job_name: &str, agent_id: AgentId) {
        debug!(
            event = "step_skipped",
            run.id = %run_id,
            step.name = job_name,
            agent.id = agent_id,
            "前序步骤失败，跳过"
        );
    }

    pub fn log_run_rejected(job_id: JobId) {
        warn!(event = "run_rejected", job.id = job_id, "作业正在运行，拒绝重复执行");
    }

    pub fn log_notification_sent(job_id: JobId, run_id: Uuid) {
        info!(
            event = "notification_sent",
            job.id = job_id,
            run.id = %run_id,
            "已发送失败告警"
        );
    }
}
