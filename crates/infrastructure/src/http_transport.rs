//! 基于HTTP的执行器传输
//!
//! 执行器在 `POST {scheme}://{host}:{port}/execute` 接收JSON请求，
//! 命令执行完毕后返回退出码和输出。

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use jobflow_core::{
    config::AgentConfig,
    errors::DispatchError,
    models::{Agent, ExecuteRequest, ExecuteResponse},
    traits::AgentTransport,
};

pub struct HttpAgentTransport {
    http_client: reqwest::Client,
    scheme: String,
    request_timeout: Duration,
}

impl HttpAgentTransport {
    pub fn new(config: &AgentConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;
        Ok(Self {
            http_client,
            scheme: config.scheme.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    fn execute_url(&self, agent: &Agent) -> String {
        format!("{}/execute", agent.endpoint(&self.scheme))
    }

    /// 作业超时之外多留一秒给执行器返回结果，没有作业超时时使用配置的兜底值
    fn timeout_for(&self, request: &ExecuteRequest) -> Duration {
        match request.timeout_seconds {
            Some(seconds) => Duration::from_secs(seconds + 1),
            None => self.request_timeout,
        }
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn execute(
        &self,
        agent: &Agent,
        request: &ExecuteRequest,
    ) -> Result<ExecuteResponse, DispatchError> {
        let url = self.execute_url(agent);
        let timeout = self.timeout_for(request);
        debug!("向执行器 {} 发送命令: {}", agent.agent_id, url);

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout {
                        agent_id: agent.agent_id,
                        timeout_seconds: timeout.as_secs(),
                    }
                } else {
                    warn!("连接执行器 {} 失败: {}", agent.agent_id, e);
                    DispatchError::Unreachable {
                        agent_id: agent.agent_id,
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("执行器 {} 返回 HTTP {}: {}", agent.agent_id, status, body);
            return Err(DispatchError::Unreachable {
                agent_id: agent.agent_id,
                message: format!("HTTP {status} - {body}"),
            });
        }

        response
            .json::<ExecuteResponse>()
            .await
            .map_err(|e| DispatchError::Unreachable {
                agent_id: agent.agent_id,
                message: format!("无法解析执行器响应: {e}"),
            })
    }
}
