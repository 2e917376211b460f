//! Test data builders
//!
//! 默认值：单任务、人工执行、执行器1、用户1、命令 `echo test`（已编码）。

use jobflow_core::{
    codec::encode_command,
    models::{
        Agent, AgentId, CronType, ExecType, Job, JobId, JobType, RunModel, UserId,
    },
};

pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: Job::new("test_job".to_string(), 1, encode_command("echo test"), 1),
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.job.job_id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.job_name = name.to_string();
        self
    }

    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.job.agent_id = agent_id;
        self
    }

    /// 明文命令，构建时编码
    pub fn with_command(mut self, command: &str) -> Self {
        self.job.command = encode_command(command);
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.job.user_id = user_id;
        self
    }

    pub fn with_exec_type(mut self, exec_type: ExecType) -> Self {
        self.job.exec_type = exec_type;
        self
    }

    /// 定时作业
    pub fn scheduled(mut self, cron_type: CronType, cron_exp: &str) -> Self {
        self.job.exec_type = ExecType::Schedule;
        self.job.cron_type = Some(cron_type);
        self.job.cron_exp = Some(cron_exp.to_string());
        self
    }

    pub fn with_timeout(mut self, seconds: i32) -> Self {
        self.job.timeout = seconds;
        self
    }

    pub fn with_retry(mut self, run_count: i32) -> Self {
        self.job.redo = 1;
        self.job.run_count = Some(run_count);
        self
    }

    pub fn with_warning(mut self, mobiles: &str) -> Self {
        self.job.warning = true;
        self.job.mobiles = Some(mobiles.to_string());
        self
    }

    /// 流程父作业，`flow_id` 在ID确定后由存储或 [`Self::with_id`] 之后的 `build` 补齐
    pub fn flow_parent(mut self, run_model: RunModel) -> Self {
        self.job.job_type = JobType::Flow;
        self.job.run_model = run_model;
        self.job.flow_num = None;
        self
    }

    pub fn flow_child(mut self, flow_id: JobId, flow_num: i32) -> Self {
        self.job.job_type = JobType::Flow;
        self.job.flow_id = Some(flow_id);
        self.job.flow_num = Some(flow_num);
        self
    }

    pub fn last_child(mut self) -> Self {
        self.job.last_child = true;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.job.deleted = true;
        self
    }

    pub fn build(mut self) -> Job {
        if self.job.is_flow_parent() && self.job.job_id != 0 {
            self.job.flow_id = Some(self.job.job_id);
        }
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent: Agent::new(
                agent_id,
                format!("agent-{agent_id}"),
                "127.0.0.1".to_string(),
                1577,
            ),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.agent.name = name.to_string();
        self
    }

    pub fn with_host(mut self, host: &str, port: u16) -> Self {
        self.agent.host = host.to_string();
        self.agent.port = port;
        self
    }

    pub fn with_owner(mut self, user_id: UserId) -> Self {
        self.agent.owner_ids.push(user_id);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.agent.deleted = true;
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::codec::decode_command;

    #[test]
    fn test_job_builder_defaults() {
        let job = JobBuilder::new().build();
        assert_eq!(job.job_type, JobType::Singleton);
        assert_eq!(job.exec_type, ExecType::Operator);
        assert_eq!(decode_command(&job.command).unwrap(), "echo test");
    }

    #[test]
    fn test_flow_parent_points_to_itself() {
        let parent = JobBuilder::new().with_id(5).flow_parent(RunModel::Parallel).build();
        assert_eq!(parent.flow_id, Some(5));
        assert!(parent.is_flow_parent());
    }

    #[test]
    fn test_agent_builder() {
        let agent = AgentBuilder::new(3).with_owner(9).build();
        assert_eq!(agent.name, "agent-3");
        assert!(agent.is_owned_by(9));
    }
}
