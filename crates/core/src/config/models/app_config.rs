use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatcher_agent::{AgentConfig, DispatcherConfig, StoreConfig},
    observability::ObservabilityConfig,
};

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub agent: AgentConfig,
    pub store: StoreConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: JOBFLOW_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/jobflow.toml", "jobflow.toml", "/etc/jobflow/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("JOBFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate().context("调度器配置验证失败")?;
        self.agent.validate().context("执行器配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.scheme, "http");
        assert!(config.store.seed_file.is_none());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = AppConfig::from_toml(
            r#"
            [dispatcher]
            enabled = true
            retry_interval_ms = 250
            idle_poll_seconds = 5
            guard_lease_slack_seconds = 10

            [store]
            seed_file = "config/seed.toml"
            "#,
        )
        .unwrap();
        assert_eq!(config.dispatcher.retry_interval_ms, 250);
        assert_eq!(config.store.seed_file.as_deref(), Some("config/seed.toml"));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [observability]
            log_level = "loud"
            log_format = "pretty"
            metrics_enabled = false
            metrics_bind_address = "0.0.0.0:9100"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file_and_round_trip() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let original = AppConfig::default();
        file.write_all(original.to_toml().unwrap().as_bytes()).unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.agent, original.agent);
        assert_eq!(loaded.dispatcher, original.dispatcher);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/jobflow.toml")).is_err());
    }
}
