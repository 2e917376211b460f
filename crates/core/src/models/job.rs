use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, JobId, UserId};

/// 作业定义
///
/// 单任务作业（`Singleton`）直接绑定执行器与命令；流程作业（`Flow`）由一个父作业
/// 与若干有序子作业组成，父作业只承载调度信息（CRON、运行模式、告警），
/// 子作业承载各自的执行器与命令。
///
/// # 字段说明
///
/// - `job_id`: 作业唯一标识，未持久化前为 0
/// - `flow_id`: 流程父作业的ID，单任务为 `None`，父作业指向自身
/// - `flow_num`: 子作业在流程中的序号（从0开始），父作业与单任务为 `None`
/// - `command`: 经过编码的命令，见 [`crate::codec`]
/// - `timeout`: 超时时间（秒），0 表示不限制
/// - `redo` / `run_count`: 失败重试开关与重试次数，`redo = 0` 时 `run_count` 必须为空
/// - `deleted`: 软删除标记，已删除作业不参与调度
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    #[serde(default)]
    pub job_id: JobId,
    #[serde(default)]
    pub flow_id: Option<JobId>,
    #[serde(default)]
    pub flow_num: Option<i32>,
    pub job_name: String,
    #[serde(default)]
    pub job_type: JobType,
    #[serde(default)]
    pub exec_type: ExecType,
    #[serde(default)]
    pub run_model: RunModel,
    #[serde(default)]
    pub cron_type: Option<CronType>,
    #[serde(default)]
    pub cron_exp: Option<String>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub agent_id: AgentId,
    #[serde(default)]
    pub timeout: i32,
    #[serde(default)]
    pub redo: i32,
    #[serde(default)]
    pub run_count: Option<i32>,
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default = "Utc::now")]
    pub update_time: DateTime<Utc>,
    #[serde(default)]
    pub warning: bool,
    #[serde(default)]
    pub mobiles: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub last_child: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

/// 作业类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum JobType {
    #[default]
    #[serde(rename = "SINGLETON")]
    Singleton,
    #[serde(rename = "FLOW")]
    Flow,
}

/// 执行方式：定时调度或人工触发
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ExecType {
    #[default]
    #[serde(rename = "SCHEDULE")]
    Schedule,
    #[serde(rename = "OPERATOR")]
    Operator,
}

/// 流程运行模式，只对流程父作业有意义，子作业继承父作业的设置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RunModel {
    #[default]
    #[serde(rename = "SERIAL")]
    Serial,
    #[serde(rename = "PARALLEL")]
    Parallel,
}

/// CRON表达式风格
///
/// - `Crontab`: 5段式（分 时 日 月 周），周日为 0 或 7
/// - `Quartz`: 6/7段式（秒 分 时 日 月 周 [年]），周日为 1
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CronType {
    #[serde(rename = "CRONTAB")]
    Crontab,
    #[default]
    #[serde(rename = "QUARTZ")]
    Quartz,
}

impl Job {
    /// 创建新的单任务作业
    pub fn new(job_name: String, agent_id: AgentId, command: String, user_id: UserId) -> Self {
        Self {
            job_id: 0, // 将由存储生成
            flow_id: None,
            flow_num: None,
            job_name,
            job_type: JobType::Singleton,
            exec_type: ExecType::Operator,
            run_model: RunModel::Serial,
            cron_type: None,
            cron_exp: None,
            command,
            agent_id,
            timeout: 0,
            redo: 0,
            run_count: None,
            user_id,
            deleted: false,
            update_time: Utc::now(),
            warning: false,
            mobiles: None,
            email_address: None,
            last_child: false,
            comment: None,
        }
    }

    pub fn is_flow(&self) -> bool {
        self.job_type == JobType::Flow
    }

    /// 流程父作业：类型为流程且没有子序号
    pub fn is_flow_parent(&self) -> bool {
        self.is_flow() && self.flow_num.is_none()
    }

    pub fn is_flow_child(&self) -> bool {
        self.is_flow() && self.flow_num.is_some()
    }

    /// 承载触发器的作业ID：流程子作业的触发器挂在父作业上
    pub fn trigger_target(&self) -> JobId {
        if self.is_flow_child() {
            self.flow_id.unwrap_or(self.job_id)
        } else {
            self.job_id
        }
    }

    /// 是否应当拥有一个活动触发器
    pub fn is_schedulable(&self) -> bool {
        !self.deleted && self.exec_type == ExecType::Schedule && !self.is_flow_child()
    }

    /// 超时时间，0 或负数表示不限制
    pub fn timeout_seconds(&self) -> Option<u64> {
        if self.timeout > 0 {
            Some(self.timeout as u64)
        } else {
            None
        }
    }

    /// 失败后额外重试的次数
    pub fn retry_budget(&self) -> u32 {
        if self.redo > 0 {
            self.run_count.unwrap_or(0).max(0) as u32
        } else {
            0
        }
    }

    /// 按 `redo` 规范化 `run_count`
    pub fn apply_retry_settings(&mut self, redo: i32, run_count: Option<i32>) -> Result<(), String> {
        self.run_count = validate_retry_settings(redo, run_count)?;
        self.redo = redo;
        Ok(())
    }

    /// 告警开启时必须至少配置一个接收人
    pub fn has_warning_recipients(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.mobiles) || filled(&self.email_address)
    }
}

/// 校验重试设置，返回规范化后的 `run_count`
pub fn validate_retry_settings(redo: i32, run_count: Option<i32>) -> Result<Option<i32>, String> {
    match redo {
        r if r < 0 => Err(format!("重试标记不能为负数: {r}")),
        0 => Ok(None),
        _ => match run_count {
            Some(count) if count > 0 => Ok(Some(count)),
            Some(count) => Err(format!("重试次数必须为正整数: {count}")),
            None => Err("开启重试时必须填写重试次数".to_string()),
        },
    }
}

/// 作业查询过滤器
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// 为空时不按所有者过滤（管理员视图）
    pub user_id: Option<UserId>,
    pub agent_id: Option<AgentId>,
    pub cron_type: Option<CronType>,
    pub job_type: Option<JobType>,
    pub exec_type: Option<ExecType>,
    pub redo: Option<bool>,
    pub include_deleted: bool,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        if !self.include_deleted && job.deleted {
            return false;
        }
        if let Some(user_id) = self.user_id {
            if job.user_id != user_id {
                return false;
            }
        }
        if let Some(agent_id) = self.agent_id {
            if job.agent_id != agent_id {
                return false;
            }
        }
        if let Some(cron_type) = self.cron_type {
            if job.cron_type != Some(cron_type) {
                return false;
            }
        }
        if let Some(job_type) = self.job_type {
            if job.job_type != job_type {
                return false;
            }
        }
        if let Some(exec_type) = self.exec_type {
            if job.exec_type != exec_type {
                return false;
            }
        }
        if let Some(redo) = self.redo {
            if (job.redo > 0) != redo {
                return false;
            }
        }
        true
    }
}

/// 删除前检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCheck {
    Ok,
    Rejected(String),
}

impl DeleteCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, DeleteCheck::Ok)
    }
}
