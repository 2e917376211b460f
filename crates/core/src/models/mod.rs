pub mod agent;
pub mod execution;
pub mod job;
pub mod service;

pub use agent::*;
pub use execution::*;
pub use job::*;
pub use service::*;

pub type JobId = i64;
pub type AgentId = i64;
pub type UserId = i64;
