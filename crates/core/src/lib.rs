pub mod codec;
pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::{
    Agent, AgentId, CallerIdentity, ExecType, Job, JobId, JobType, Outcome, RunModel, UserId,
};
pub use traits::{AgentDirectory, AgentTransport, JobStore, Notifier};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
