//! 启动数据
//!
//! 从TOML文件加载执行器和作业，填充内存存储。作业命令以明文书写，加载时编码。

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use jobflow_core::{
    codec::encode_command,
    models::{Agent, Job},
};

use crate::memory_store::{InMemoryAgentDirectory, InMemoryJobStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl SeedData {
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut seed: SeedData = toml::from_str(content).context("解析启动数据失败")?;
        for job in &mut seed.jobs {
            job.command = encode_command(&job.command);
        }
        Ok(seed)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取启动数据文件失败: {}", path.display()))?;
        let seed = Self::from_toml(&content)?;
        info!(
            "从 {} 加载 {} 个执行器、{} 个作业",
            path.display(),
            seed.agents.len(),
            seed.jobs.len()
        );
        Ok(seed)
    }

    pub fn into_stores(self) -> (InMemoryJobStore, InMemoryAgentDirectory) {
        (
            InMemoryJobStore::with_jobs(self.jobs),
            InMemoryAgentDirectory::with_agents(self.agents),
        )
    }
}
