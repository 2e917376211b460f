//! 触发器调度
//!
//! 每个未删除的定时作业对应一个触发器，流程作业的触发器挂在父作业上。
//! 作业变更后调用 [`TriggerScheduler::sync_trigger`] 让触发器与存储保持一致，
//! 后台循环 [`TriggerScheduler::run`] 在最近的触发时间醒来并派发到期的作业。
//! 同步和删除都在同步锁内完成，读到的作业快照不会覆盖之后的删除。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, Notify};
use tracing::{debug, error, info, warn};

use jobflow_core::{
    models::{CronType, Job, JobId},
    traits::JobStore,
    SchedulerError, SchedulerResult,
};
use jobflow_infrastructure::{MetricsCollector, StructuredLogger};

use crate::cron_utils::CronScheduler;

/// 触发器到期时的回调
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn on_fire(&self, job_id: JobId, scheduled_at: DateTime<Utc>);
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub job_id: JobId,
    pub cron_type: CronType,
    pub cron_exp: String,
    pub next_fire: Option<DateTime<Utc>>,
    schedule: CronScheduler,
}

/// 一次同步的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSync {
    Created,
    /// 表达式或风格变化，重新计算了触发时间
    Rescheduled,
    Unchanged,
    /// 作业不再需要触发器，已有触发器被移除
    Removed,
    /// 作业不需要触发器，本来也没有
    Absent,
}

/// 触发器表，不含任何异步逻辑
#[derive(Debug, Default)]
pub struct TriggerRegistry {
    triggers: HashMap<JobId, Trigger>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(
        &mut self,
        job_id: JobId,
        cron_type: CronType,
        cron_exp: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TriggerSync> {
        if let Some(existing) = self.triggers.get(&job_id) {
            if existing.cron_type == cron_type && existing.cron_exp == cron_exp {
                return Ok(TriggerSync::Unchanged);
            }
        }

        let schedule = CronScheduler::new(cron_exp, cron_type)?;
        let trigger = Trigger {
            job_id,
            cron_type,
            cron_exp: cron_exp.to_string(),
            next_fire: schedule.next_execution_time(now),
            schedule,
        };
        Ok(match self.triggers.insert(job_id, trigger) {
            Some(_) => TriggerSync::Rescheduled,
            None => TriggerSync::Created,
        })
    }

    pub fn remove(&mut self, job_id: JobId) -> bool {
        self.triggers.remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: JobId) -> Option<&Trigger> {
        self.triggers.get(&job_id)
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.triggers.contains_key(&job_id)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// 最早的触发时间
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.triggers.values().filter_map(|t| t.next_fire).min()
    }

    /// 取出所有到期的触发器并推进到 `now` 之后的下一次
    ///
    /// 错过的多次触发只补一次。
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<(JobId, DateTime<Utc>)> {
        let mut due = Vec::new();
        for trigger in self.triggers.values_mut() {
            if let Some(fire_at) = trigger.next_fire {
                if fire_at <= now {
                    due.push((trigger.job_id, fire_at));
                    trigger.next_fire = trigger.schedule.next_execution_time(now);
                }
            }
        }
        due.sort_by_key(|(job_id, fire_at)| (*fire_at, *job_id));
        due
    }
}

pub struct TriggerScheduler {
    registry: Mutex<TriggerRegistry>,
    sync_lock: AsyncMutex<()>,
    changed: Notify,
    job_store: Arc<dyn JobStore>,
    metrics: Arc<MetricsCollector>,
    idle_poll: Duration,
}

impl TriggerScheduler {
    pub fn new(job_store: Arc<dyn JobStore>, metrics: Arc<MetricsCollector>, idle_poll: Duration) -> Self {
        Self {
            registry: Mutex::new(TriggerRegistry::new()),
            sync_lock: AsyncMutex::new(()),
            changed: Notify::new(),
            job_store,
            metrics,
            idle_poll,
        }
    }

    fn registry(&self) -> MutexGuard<'_, TriggerRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 同步锁
    ///
    /// 持有期间其他同步不会读取作业。删除作业时在锁内移除触发器并落库。
    pub async fn sync_guard(&self) -> AsyncMutexGuard<'_, ()> {
        self.sync_lock.lock().await
    }

    /// 按存储中的作业状态同步触发器
    ///
    /// 流程子作业同步其父作业的触发器。定时作业的CRON表达式缺失或无效时，
    /// 先移除已有触发器，再返回调度错误。
    pub async fn sync_trigger(&self, job_id: JobId) -> SchedulerResult<TriggerSync> {
        let _sync = self.sync_guard().await;
        let Some(job) = self.job_store.get_job(job_id).await? else {
            return Ok(self.remove_with_outcome(job_id));
        };

        let job = if job.is_flow_child() {
            let flow_id = job.trigger_target();
            match self.job_store.get_job(flow_id).await? {
                Some(parent) => parent,
                None => return Ok(self.remove_with_outcome(flow_id)),
            }
        } else {
            job
        };

        self.apply(&job, Utc::now())
    }

    /// 用给定的作业快照同步触发器
    pub fn apply(&self, job: &Job, now: DateTime<Utc>) -> SchedulerResult<TriggerSync> {
        let job_id = job.job_id;
        if !job.is_schedulable() {
            return Ok(self.remove_with_outcome(job_id));
        }

        let cron_exp = job.cron_exp.as_deref().map(str::trim).unwrap_or_default();
        if cron_exp.is_empty() {
            self.remove_trigger(job_id);
            return Err(SchedulerError::scheduling(job_id, "定时作业缺少CRON表达式"));
        }
        let cron_type = job.cron_type.unwrap_or_default();

        let result = self.registry().upsert(job_id, cron_type, cron_exp, now);
        match result {
            Ok(outcome) => {
                if outcome != TriggerSync::Unchanged {
                    StructuredLogger::log_trigger_synced(job_id, cron_exp, self.next_fire_time(job_id));
                    self.after_change();
                }
                Ok(outcome)
            }
            Err(e) => {
                self.remove_trigger(job_id);
                Err(SchedulerError::scheduling(job_id, e.to_string()))
            }
        }
    }

    fn remove_with_outcome(&self, job_id: JobId) -> TriggerSync {
        if self.remove_trigger(job_id) {
            TriggerSync::Removed
        } else {
            TriggerSync::Absent
        }
    }

    pub fn remove_trigger(&self, job_id: JobId) -> bool {
        let removed = self.registry().remove(job_id);
        if removed {
            StructuredLogger::log_trigger_removed(job_id);
            self.after_change();
        }
        removed
    }

    fn after_change(&self) {
        self.metrics.set_active_triggers(self.trigger_count());
        self.changed.notify_one();
    }

    pub fn has_trigger(&self, job_id: JobId) -> bool {
        self.registry().contains(job_id)
    }

    pub fn next_fire_time(&self, job_id: JobId) -> Option<DateTime<Utc>> {
        self.registry().get(job_id).and_then(|t| t.next_fire)
    }

    pub fn trigger_count(&self) -> usize {
        self.registry().len()
    }

    pub fn trigger(&self, job_id: JobId) -> Option<Trigger> {
        self.registry().get(job_id).cloned()
    }

    /// 启动时为所有定时作业注册触发器，单个作业失败只记录日志
    pub async fn init_triggers(&self) -> SchedulerResult<usize> {
        let _sync = self.sync_guard().await;
        let jobs = self.job_store.get_scheduled_jobs().await?;
        let now = Utc::now();
        let mut registered = 0;
        for job in &jobs {
            match self.apply(job, now) {
                Ok(TriggerSync::Created | TriggerSync::Rescheduled | TriggerSync::Unchanged) => {
                    registered += 1
                }
                Ok(_) => {}
                Err(e) => warn!("作业 {} 注册触发器失败: {}", job.job_id, e),
            }
        }
        info!("初始化触发器完成: {}/{}", registered, jobs.len());
        Ok(registered)
    }

    /// 取出到期触发器并逐个派发，派发不阻塞循环
    pub fn fire_due(&self, handler: &Arc<dyn TriggerHandler>, now: DateTime<Utc>) -> usize {
        let due = self.registry().take_due(now);
        for (job_id, scheduled_at) in &due {
            StructuredLogger::log_trigger_fired(*job_id, *scheduled_at);
            self.metrics.record_trigger_fire();
            let handler = Arc::clone(handler);
            let (job_id, scheduled_at) = (*job_id, *scheduled_at);
            tokio::spawn(async move {
                handler.on_fire(job_id, scheduled_at).await;
            });
        }
        due.len()
    }

    fn sleep_duration(&self, now: DateTime<Utc>) -> Duration {
        match self.registry().next_deadline() {
            Some(deadline) => (deadline - now).to_std().unwrap_or(Duration::ZERO),
            None => self.idle_poll,
        }
    }

    /// 定时循环，收到关闭信号后退出
    pub async fn run(self: Arc<Self>, handler: Arc<dyn TriggerHandler>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("触发器调度循环启动，当前触发器数量: {}", self.trigger_count());

        loop {
            let sleep_for = self.sleep_duration(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {
                    let fired = self.fire_due(&handler, Utc::now());
                    if fired > 0 {
                        debug!("本轮派发 {} 个触发器", fired);
                    }
                }
                _ = self.changed.notified() => {
                    debug!("触发器发生变化，重新计算等待时间");
                }
                result = shutdown_rx.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            info!("收到关闭信号，触发器调度循环退出");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            error!("关闭信号接收滞后，触发器调度循环退出");
                            break;
                        }
                    }
                }
            }
        }
    }
}
