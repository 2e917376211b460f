//! Mock implementations for the transport, notifier and store traits

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobflow_core::{
    errors::DispatchError,
    models::{
        Agent, AgentId, DeleteCheck, ExecuteRequest, ExecuteResponse, FailureNotice, Job, JobFilter,
        JobId, UserId,
    },
    traits::{AgentDirectory, AgentTransport, JobStore, Notifier},
    SchedulerError, SchedulerResult,
};

/// 执行器的一次应答
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 退出码0
    Success(Option<String>),
    /// 非零退出码
    Exit(i32),
    /// 连接失败
    Unreachable,
    /// 等待一段时间后成功
    Delay(Duration),
}

/// 一次分发记录
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub agent_id: AgentId,
    pub request: ExecuteRequest,
    pub at: DateTime<Utc>,
}

/// 可编排应答的执行器传输
///
/// 每个执行器先消费排队的应答，队列为空时使用该执行器的默认应答，
/// 都没有时返回成功。
#[derive(Debug, Clone, Default)]
pub struct MockAgentTransport {
    scripted: Arc<Mutex<HashMap<AgentId, VecDeque<MockReply>>>>,
    defaults: Arc<Mutex<HashMap<AgentId, MockReply>>>,
    journal: Arc<Mutex<Vec<DispatchRecord>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockAgentTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为执行器追加一次性应答
    pub fn script(&self, agent_id: AgentId, replies: Vec<MockReply>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(agent_id)
            .or_default()
            .extend(replies);
    }

    pub fn set_default(&self, agent_id: AgentId, reply: MockReply) {
        self.defaults.lock().unwrap().insert(agent_id, reply);
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.journal.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.journal.lock().unwrap().len()
    }

    pub fn calls_for(&self, agent_id: AgentId) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .count()
    }

    /// 分发到达各执行器的顺序
    pub fn agent_order(&self) -> Vec<AgentId> {
        self.journal.lock().unwrap().iter().map(|r| r.agent_id).collect()
    }

    /// 同时在途请求数的峰值
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, agent_id: AgentId) -> MockReply {
        if let Some(reply) = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&agent_id)
            .and_then(|queue| queue.pop_front())
        {
            return reply;
        }
        self.defaults
            .lock()
            .unwrap()
            .get(&agent_id)
            .cloned()
            .unwrap_or(MockReply::Success(None))
    }
}

#[async_trait]
impl AgentTransport for MockAgentTransport {
    async fn execute(
        &self,
        agent: &Agent,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, DispatchError> {
        self.journal.lock().unwrap().push(DispatchRecord {
            agent_id: agent.agent_id,
            request: request.clone(),
            at: Utc::now(),
        });
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _in_flight = InFlightGuard(self.in_flight.clone());

        let reply = self.next_reply(agent.agent_id);
        match reply {
            MockReply::Success(output) => Ok(ExecuteResponse::success(output)),
            MockReply::Exit(code) => Ok(ExecuteResponse {
                exit_code: code,
                output: None,
            }),
            MockReply::Unreachable => Err(DispatchError::Unreachable {
                agent_id: agent.agent_id,
                message: "connection refused".to_string(),
            }),
            MockReply::Delay(duration) => {
                tokio::time::sleep(duration).await;
                Ok(ExecuteResponse::success(None))
            }
        }
    }
}

/// 请求被取消（例如超时）时同样递减在途计数
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 收集所有告警的通知器
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<FailureNotice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<FailureNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &FailureNotice) -> SchedulerResult<()> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// 前几次 `get_job` 先等待一段时间的作业存储
///
/// 用来制造“读到快照之后、写回之前”的并发窗口，其余操作直接转发。
pub struct SlowJobStore {
    inner: Arc<dyn JobStore>,
    delay: Duration,
    slow_reads: AtomicUsize,
}

impl SlowJobStore {
    pub fn new(inner: Arc<dyn JobStore>, delay: Duration, slow_reads: usize) -> Self {
        Self {
            inner,
            delay,
            slow_reads: AtomicUsize::new(slow_reads),
        }
    }
}

#[async_trait]
impl JobStore for SlowJobStore {
    async fn get_job(&self, id: JobId) -> SchedulerResult<Option<Job>> {
        let slow = self
            .slow_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let job = self.inner.get_job(id).await?;
        if slow {
            tokio::time::sleep(self.delay).await;
        }
        Ok(job)
    }

    async fn merge(&self, job: &Job) -> SchedulerResult<Job> {
        self.inner.merge(job).await
    }

    async fn save_flow_job(&self, parent: &Job, children: &[Job]) -> SchedulerResult<(Job, Vec<Job>)> {
        self.inner.save_flow_job(parent, children).await
    }

    async fn get_flow_children(&self, flow_id: JobId) -> SchedulerResult<Vec<Job>> {
        self.inner.get_flow_children(flow_id).await
    }

    async fn exists_name(&self, job_id: Option<JobId>, agent_id: AgentId, name: &str) -> SchedulerResult<bool> {
        self.inner.exists_name(job_id, agent_id, name).await
    }

    async fn check_delete(&self, id: JobId) -> SchedulerResult<DeleteCheck> {
        self.inner.check_delete(id).await
    }

    async fn delete(&self, id: JobId) -> SchedulerResult<()> {
        self.inner.delete(id).await
    }

    async fn purge(&self, id: JobId) -> SchedulerResult<()> {
        self.inner.purge(id).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> SchedulerResult<Vec<Job>> {
        self.inner.list_jobs(filter).await
    }

    async fn get_scheduled_jobs(&self) -> SchedulerResult<Vec<Job>> {
        self.inner.get_scheduled_jobs().await
    }
}

/// 对指定执行器的查询返回存储错误的目录
pub struct FaultyAgentDirectory {
    inner: Arc<dyn AgentDirectory>,
    failing: Vec<AgentId>,
}

impl FaultyAgentDirectory {
    pub fn new(inner: Arc<dyn AgentDirectory>, failing: Vec<AgentId>) -> Self {
        Self { inner, failing }
    }
}

#[async_trait]
impl AgentDirectory for FaultyAgentDirectory {
    async fn get_agent(&self, id: AgentId) -> SchedulerResult<Option<Agent>> {
        if self.failing.contains(&id) {
            return Err(SchedulerError::Store(format!("执行器目录不可用: {id}")));
        }
        self.inner.get_agent(id).await
    }

    async fn get_owner_agents(&self, user_id: UserId) -> SchedulerResult<Vec<Agent>> {
        self.inner.get_owner_agents(user_id).await
    }
}
