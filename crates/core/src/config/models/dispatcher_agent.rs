use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// 失败步骤两次重试之间的间隔（毫秒）
    pub retry_interval_ms: u64,
    /// 没有任何触发器时定时循环的轮询间隔
    pub idle_poll_seconds: u64,
    /// 运行守卫租约在理论最长执行时间之外额外保留的时间
    pub guard_lease_slack_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_interval_ms: 1000,
            idle_poll_seconds: 60,
            guard_lease_slack_seconds: 30,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.idle_poll_seconds == 0 {
            return Err(anyhow::anyhow!("空闲轮询间隔必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// 执行器通信协议
    pub scheme: String,
    /// 作业没有设置超时时HTTP请求的兜底超时
    pub request_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            request_timeout_seconds: 3600,
            connect_timeout_seconds: 5,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_schemes = ["http", "https"];
        if !valid_schemes.contains(&self.scheme.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的执行器协议: {}，支持的协议: {:?}",
                self.scheme,
                valid_schemes
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StoreConfig {
    /// 启动时加载的作业与执行器数据文件
    pub seed_file: Option<String>,
}
