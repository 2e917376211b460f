use serde::{Deserialize, Serialize};

use super::{AgentId, UserId};

/// 执行器（远程Agent）
///
/// 作业通过 `agent_id` 引用执行器，执行器不归作业所有。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    pub agent_id: AgentId,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// 允许使用该执行器的用户
    #[serde(default)]
    pub owner_ids: Vec<UserId>,
    #[serde(default)]
    pub deleted: bool,
}

impl Agent {
    pub fn new(agent_id: AgentId, name: String, host: String, port: u16) -> Self {
        Self {
            agent_id,
            name,
            host,
            port,
            owner_ids: Vec::new(),
            deleted: false,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_ids.contains(&user_id)
    }

    /// 执行器服务地址
    pub fn endpoint(&self, scheme: &str) -> String {
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}
