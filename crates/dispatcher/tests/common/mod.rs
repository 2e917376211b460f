#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use jobflow_core::models::{Agent, Job};
use jobflow_core::traits::{AgentDirectory, JobStore};
use jobflow_dispatcher::{
    ExecuteService, FlowPlanner, JobService, RetryPolicy, RunGuard, TriggerScheduler,
};
use jobflow_infrastructure::{InMemoryAgentDirectory, InMemoryJobStore, MetricsCollector};
use jobflow_testing_utils::{AgentBuilder, MockAgentTransport, RecordingNotifier};

/// 用户1拥有执行器1-3，用户2拥有执行器9
pub struct Harness {
    pub store: Arc<InMemoryJobStore>,
    pub agents: Arc<InMemoryAgentDirectory>,
    pub transport: MockAgentTransport,
    pub notifier: RecordingNotifier,
    pub run_guard: Arc<RunGuard>,
    pub triggers: Arc<TriggerScheduler>,
    pub executor: ExecuteService,
    pub service: JobService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_jobs(Vec::new())
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self::build(jobs, default_agents())
    }

    pub fn build(jobs: Vec<Job>, agents: Vec<Agent>) -> Self {
        let store = Arc::new(InMemoryJobStore::with_jobs(jobs));
        let agents = Arc::new(InMemoryAgentDirectory::with_agents(agents));
        Self::assemble(store.clone(), agents.clone(), store, agents)
    }

    /// 服务使用包装后的存储和目录，`store` 与 `agents` 字段仍指向底层内存实现
    pub fn wrapped(
        jobs: Vec<Job>,
        wrap_store: impl FnOnce(Arc<dyn JobStore>) -> Arc<dyn JobStore>,
        wrap_agents: impl FnOnce(Arc<dyn AgentDirectory>) -> Arc<dyn AgentDirectory>,
    ) -> Self {
        let store = Arc::new(InMemoryJobStore::with_jobs(jobs));
        let agents = Arc::new(InMemoryAgentDirectory::with_agents(default_agents()));
        let job_store = wrap_store(store.clone());
        let directory = wrap_agents(agents.clone());
        Self::assemble(store, agents, job_store, directory)
    }

    fn assemble(
        store: Arc<InMemoryJobStore>,
        agents: Arc<InMemoryAgentDirectory>,
        job_store: Arc<dyn JobStore>,
        directory: Arc<dyn AgentDirectory>,
    ) -> Self {
        let transport = MockAgentTransport::new();
        let notifier = RecordingNotifier::new();
        let run_guard = Arc::new(RunGuard::new());
        let metrics = Arc::new(MetricsCollector::new());

        let triggers = Arc::new(TriggerScheduler::new(
            job_store.clone(),
            metrics.clone(),
            Duration::from_secs(60),
        ));
        let executor = ExecuteService::new(
            job_store.clone(),
            Arc::new(FlowPlanner::new(directory.clone())),
            Arc::new(transport.clone()),
            Arc::new(notifier.clone()),
            run_guard.clone(),
            metrics,
            RetryPolicy {
                interval: Duration::from_millis(10),
                lease_slack: Duration::from_secs(1),
            },
        );
        let service = JobService::new(job_store, directory, triggers.clone(), executor.clone());

        Self {
            store,
            agents,
            transport,
            notifier,
            run_guard,
            triggers,
            executor,
            service,
        }
    }
}

pub fn default_agents() -> Vec<Agent> {
    vec![
        AgentBuilder::new(1).with_owner(1).build(),
        AgentBuilder::new(2).with_owner(1).build(),
        AgentBuilder::new(3).with_owner(1).build(),
        AgentBuilder::new(9).with_owner(2).build(),
    ]
}
