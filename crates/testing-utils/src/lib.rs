//! # Jobflow Testing Utils
//!
//! 各crate共用的测试工具：
//!
//! - **Mock Transport**: 按执行器编排应答的 [`mocks::MockAgentTransport`]，记录所有分发请求
//! - **Recording Notifier**: 收集告警的 [`mocks::RecordingNotifier`]
//! - **Store Wrappers**: 延迟读取的 [`mocks::SlowJobStore`] 与查询出错的 [`mocks::FaultyAgentDirectory`]
//! - **Test Data Builders**: 作业与执行器的构建器
//! - **Helpers**: 异步条件等待
//!
//! ```toml
//! [dev-dependencies]
//! jobflow-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
