use serde::{Deserialize, Serialize};

use super::{Agent, AgentId, CronType, ExecType, Job, JobId, JobType, RunModel, UserId};

/// 调用者身份，每个核心操作都显式传入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: UserId,
    /// 管理员可以操作任何人的作业
    #[serde(default)]
    pub admin: bool,
}

impl CallerIdentity {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            admin: false,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            admin: true,
        }
    }
}

/// 作业服务操作的显式结果
///
/// 所有权校验失败与参数校验失败都是正常的业务结果，不作为错误抛出。
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Applied(T),
    NotFound,
    NotOwner,
    Invalid(String),
}

impl<T> Outcome<T> {
    pub fn invalid<S: Into<String>>(reason: S) -> Self {
        Outcome::Invalid(reason.into())
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Applied(value) => Outcome::Applied(f(value)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::NotOwner => Outcome::NotOwner,
            Outcome::Invalid(reason) => Outcome::Invalid(reason),
        }
    }
}

/// 子作业描述，按流程中的顺序排列
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildJobSpec {
    /// 已存在的子作业ID，修改流程时填写
    pub job_id: Option<JobId>,
    pub job_name: String,
    pub agent_id: AgentId,
    /// 明文命令
    pub command: String,
    pub timeout: i32,
    pub redo: i32,
    pub run_count: Option<i32>,
    pub comment: Option<String>,
}

/// 保存作业的表单
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobForm {
    /// 为空时新建，否则覆盖已有作业
    pub job_id: Option<JobId>,
    pub job_name: String,
    pub job_type: JobType,
    pub exec_type: ExecType,
    pub run_model: RunModel,
    pub cron_type: Option<CronType>,
    pub cron_exp: Option<String>,
    /// 明文命令（流程父作业可为空）
    pub command: String,
    pub agent_id: AgentId,
    pub timeout: i32,
    pub redo: i32,
    pub run_count: Option<i32>,
    pub warning: bool,
    pub mobiles: Option<String>,
    pub email_address: Option<String>,
    pub comment: Option<String>,
    pub children: Vec<ChildJobSpec>,
}

/// 单个作业的编辑内容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobEdit {
    pub job_name: String,
    pub exec_type: ExecType,
    pub cron_type: Option<CronType>,
    pub cron_exp: Option<String>,
    /// 明文命令
    pub command: String,
    pub timeout: i32,
    pub redo: i32,
    pub run_count: Option<i32>,
    pub warning: bool,
    pub mobiles: Option<String>,
    pub email_address: Option<String>,
    pub comment: Option<String>,
}

/// 作业详情视图
#[derive(Debug, Clone, PartialEq)]
pub struct JobView {
    pub job: Job,
    pub agent: Option<Agent>,
    /// 明文命令，解码失败时为空
    pub command: Option<String>,
    /// 流程子作业（按序号排列）
    pub children: Vec<Job>,
    pub running: bool,
}

/// 分页请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 从1开始
    pub page_no: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_no: 1,
            page_size: 15,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page_no: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    /// 从完整列表中截取一页
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let page_size = request.page_size.max(1);
        let page_no = request.page_no.max(1);
        let total = all.len();
        let items = all
            .into_iter()
            .skip((page_no - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Self {
            items,
            total,
            page_no,
            page_size,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size.max(1))
    }
}
