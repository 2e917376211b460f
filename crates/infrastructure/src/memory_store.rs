//! 内存实现的作业存储与执行器目录
//!
//! 持久化机制不在核心范围内，这里的实现用于单机运行和测试。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use jobflow_core::{
    models::{Agent, AgentId, DeleteCheck, Job, JobFilter, JobId, JobType, UserId},
    traits::{AgentDirectory, JobStore},
    SchedulerError, SchedulerResult,
};

pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    next_id: AtomicI64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// 使用已有作业初始化，ID为0的作业会分配新ID
    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let max_id = jobs.iter().map(|j| j.job_id).max().unwrap_or(0);
        let next_id = AtomicI64::new(max_id + 1);
        let mut map = HashMap::new();
        for mut job in jobs {
            if job.job_id == 0 {
                job.job_id = next_id.fetch_add(1, Ordering::SeqCst);
            }
            map.insert(job.job_id, job);
        }
        Self {
            jobs: RwLock::new(map),
            next_id,
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// 所有作业的快照（包括已删除的），按ID排序
    pub async fn snapshot(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.job_id);
        jobs
    }

    fn allocate_id(&self) -> JobId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn flow_members(jobs: &HashMap<JobId, Job>, flow_id: JobId) -> Vec<JobId> {
        jobs.values()
            .filter(|j| j.flow_id == Some(flow_id) && j.flow_num.is_some())
            .map(|j| j.job_id)
            .collect()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get_job(&self, id: JobId) -> SchedulerResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn merge(&self, job: &Job) -> SchedulerResult<Job> {
        let mut saved = job.clone();
        if saved.job_id == 0 {
            saved.job_id = self.allocate_id();
        }
        if saved.is_flow_parent() {
            saved.flow_id = Some(saved.job_id);
        }
        self.jobs.write().await.insert(saved.job_id, saved.clone());
        debug!("保存作业 {} ({})", saved.job_id, saved.job_name);
        Ok(saved)
    }

    async fn save_flow_job(&self, parent: &Job, children: &[Job]) -> SchedulerResult<(Job, Vec<Job>)> {
        if children.is_empty() {
            return Err(SchedulerError::validation("流程作业必须至少包含一个子作业"));
        }

        let mut jobs = self.jobs.write().await;

        let mut saved_parent = parent.clone();
        if saved_parent.job_id == 0 {
            saved_parent.job_id = self.allocate_id();
        }
        let flow_id = saved_parent.job_id;
        saved_parent.job_type = JobType::Flow;
        saved_parent.flow_id = Some(flow_id);
        saved_parent.flow_num = None;
        saved_parent.last_child = false;

        let kept: HashSet<JobId> = children.iter().map(|c| c.job_id).filter(|id| *id != 0).collect();
        let now = Utc::now();
        for stale_id in Self::flow_members(&jobs, flow_id) {
            if !kept.contains(&stale_id) {
                if let Some(stale) = jobs.get_mut(&stale_id) {
                    stale.deleted = true;
                    stale.update_time = now;
                    debug!("流程 {} 移除子作业 {}", flow_id, stale_id);
                }
            }
        }

        let last_index = children.len() - 1;
        let mut saved_children = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            let mut saved = child.clone();
            if saved.job_id == 0 {
                saved.job_id = self.allocate_id();
            }
            saved.job_type = JobType::Flow;
            saved.flow_id = Some(flow_id);
            saved.flow_num = Some(index as i32);
            saved.run_model = saved_parent.run_model;
            saved.exec_type = saved_parent.exec_type;
            saved.user_id = saved_parent.user_id;
            saved.last_child = index == last_index;
            saved.deleted = false;
            jobs.insert(saved.job_id, saved.clone());
            saved_children.push(saved);
        }

        jobs.insert(flow_id, saved_parent.clone());
        debug!(
            "保存流程作业 {} ({})，共 {} 个子作业",
            flow_id,
            saved_parent.job_name,
            saved_children.len()
        );

        Ok((saved_parent, saved_children))
    }

    async fn get_flow_children(&self, flow_id: JobId) -> SchedulerResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut children: Vec<Job> = jobs
            .values()
            .filter(|j| j.flow_id == Some(flow_id) && j.flow_num.is_some() && !j.deleted)
            .cloned()
            .collect();
        children.sort_by_key(|j| j.flow_num);
        Ok(children)
    }

    async fn exists_name(&self, job_id: Option<JobId>, agent_id: AgentId, name: &str) -> SchedulerResult<bool> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().any(|j| {
            !j.deleted && j.agent_id == agent_id && j.job_name == name && Some(j.job_id) != job_id
        }))
    }

    async fn check_delete(&self, id: JobId) -> SchedulerResult<DeleteCheck> {
        let jobs = self.jobs.read().await;
        Ok(match jobs.get(&id) {
            None => DeleteCheck::Rejected("作业不存在".to_string()),
            Some(job) if job.deleted => DeleteCheck::Rejected("作业已删除".to_string()),
            Some(_) => DeleteCheck::Ok,
        })
    }

    async fn delete(&self, id: JobId) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get(&id).cloned().ok_or(SchedulerError::JobNotFound { id })?;

        let mut targets = vec![id];
        if job.is_flow_parent() {
            targets.extend(Self::flow_members(&jobs, id));
        }

        let now = Utc::now();
        for target in targets {
            if let Some(entry) = jobs.get_mut(&target) {
                entry.deleted = true;
                entry.update_time = now;
            }
        }
        Ok(())
    }

    async fn purge(&self, id: JobId) -> SchedulerResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get(&id).cloned().ok_or(SchedulerError::JobNotFound { id })?;
        if !job.deleted {
            return Err(SchedulerError::validation(format!(
                "作业 {id} 尚未删除，不能清除"
            )));
        }

        if job.is_flow_parent() {
            for member in Self::flow_members(&jobs, id) {
                jobs.remove(&member);
            }
        }
        jobs.remove(&id);
        Ok(())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> SchedulerResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<Job> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        matched.sort_by(|a, b| {
            b.update_time
                .cmp(&a.update_time)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });
        Ok(matched)
    }

    async fn get_scheduled_jobs(&self) -> SchedulerResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|j| j.is_schedulable()).cloned().collect())
    }
}

pub struct InMemoryAgentDirectory {
    agents: RwLock<HashMap<AgentId, Agent>>,
}

impl InMemoryAgentDirectory {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_agents(agents: Vec<Agent>) -> Self {
        Self {
            agents: RwLock::new(agents.into_iter().map(|a| (a.agent_id, a)).collect()),
        }
    }

    pub async fn register(&self, agent: Agent) {
        self.agents.write().await.insert(agent.agent_id, agent);
    }

    pub async fn mark_deleted(&self, id: AgentId) -> bool {
        match self.agents.write().await.get_mut(&id) {
            Some(agent) => {
                agent.deleted = true;
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryAgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn get_agent(&self, id: AgentId) -> SchedulerResult<Option<Agent>> {
        Ok(self.agents.read().await.get(&id).cloned())
    }

    async fn get_owner_agents(&self, user_id: UserId) -> SchedulerResult<Vec<Agent>> {
        let agents = self.agents.read().await;
        let mut owned: Vec<Agent> = agents
            .values()
            .filter(|a| !a.deleted && a.is_owned_by(user_id))
            .cloned()
            .collect();
        owned.sort_by_key(|a| a.agent_id);
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::models::{ExecType, RunModel};

    fn child(name: &str, agent_id: AgentId) -> Job {
        let mut job = Job::new(name.to_string(), agent_id, "ZWNobw==".to_string(), 1);
        job.job_type = JobType::Flow;
        job
    }

    fn flow_parent(name: &str) -> Job {
        let mut job = Job::new(name.to_string(), 0, String::new(), 1);
        job.job_type = JobType::Flow;
        job.exec_type = ExecType::Schedule;
        job.run_model = RunModel::Parallel;
        job
    }

    #[tokio::test]
    async fn test_merge_assigns_id() {
        let store = InMemoryJobStore::new();
        let saved = store
            .merge(&Job::new("backup".to_string(), 1, String::new(), 1))
            .await
            .unwrap();
        assert_eq!(saved.job_id, 1);
        assert_eq!(store.get_job(1).await.unwrap().unwrap().job_name, "backup");
    }

    #[tokio::test]
    async fn test_save_flow_job_links_children() {
        let store = InMemoryJobStore::new();
        let (parent, children) = store
            .save_flow_job(&flow_parent("etl"), &[child("extract", 1), child("load", 2)])
            .await
            .unwrap();

        assert_eq!(parent.flow_id, Some(parent.job_id));
        assert!(parent.is_flow_parent());
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.flow_id == Some(parent.job_id)));
        assert!(children.iter().all(|c| c.run_model == RunModel::Parallel));
        assert!(!children[0].last_child);
        assert!(children[1].last_child);

        let loaded = store.get_flow_children(parent.job_id).await.unwrap();
        assert_eq!(
            loaded.iter().map(|c| c.job_name.as_str()).collect::<Vec<_>>(),
            vec!["extract", "load"]
        );
    }

    #[tokio::test]
    async fn test_save_flow_job_rejects_empty_children() {
        let store = InMemoryJobStore::new();
        assert!(store.save_flow_job(&flow_parent("etl"), &[]).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_resave_flow_drops_missing_children() {
        let store = InMemoryJobStore::new();
        let (parent, children) = store
            .save_flow_job(&flow_parent("etl"), &[child("a", 1), child("b", 1)])
            .await
            .unwrap();

        let kept = children[1].clone();
        let (_, resaved) = store.save_flow_job(&parent, &[kept]).await.unwrap();
        assert_eq!(resaved[0].flow_num, Some(0));
        assert!(resaved[0].last_child);

        let remaining = store.get_flow_children(parent.job_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].job_name, "b");
        assert!(store.get_job(children[0].job_id).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn test_delete_and_purge_flow() {
        let store = InMemoryJobStore::new();
        let (parent, children) = store
            .save_flow_job(&flow_parent("etl"), &[child("a", 1)])
            .await
            .unwrap();

        assert!(store.purge(parent.job_id).await.is_err());

        store.delete(parent.job_id).await.unwrap();
        assert!(store.get_job(children[0].job_id).await.unwrap().unwrap().deleted);
        assert_eq!(
            store.check_delete(parent.job_id).await.unwrap(),
            DeleteCheck::Rejected("作业已删除".to_string())
        );

        store.purge(parent.job_id).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_exists_name() {
        let store = InMemoryJobStore::new();
        let saved = store
            .merge(&Job::new("backup".to_string(), 1, String::new(), 1))
            .await
            .unwrap();

        assert!(store.exists_name(None, 1, "backup").await.unwrap());
        assert!(!store.exists_name(Some(saved.job_id), 1, "backup").await.unwrap());
        assert!(!store.exists_name(None, 2, "backup").await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_agents() {
        let mut a = Agent::new(1, "a".to_string(), "127.0.0.1".to_string(), 1577);
        a.owner_ids = vec![7];
        let mut b = Agent::new(2, "b".to_string(), "127.0.0.1".to_string(), 1578);
        b.owner_ids = vec![7];
        b.deleted = true;
        let directory = InMemoryAgentDirectory::with_agents(vec![a, b]);

        let owned = directory.get_owner_agents(7).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].agent_id, 1);
        assert!(directory.get_owner_agents(8).await.unwrap().is_empty());
    }
}
