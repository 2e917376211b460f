pub mod app_config;
pub mod dispatcher_agent;
pub mod observability;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use dispatcher_agent::{AgentConfig, DispatcherConfig, StoreConfig};
pub use observability::ObservabilityConfig;
