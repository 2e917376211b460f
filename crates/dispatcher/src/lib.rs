//! Dispatcher
//!
//! 作业调度与流程编排核心：触发器调度、流程规划、执行分发、运行守卫和所有权校验，
//! 以及在其上组合出的作业服务。

pub mod cron_utils;
pub mod execute_service;
pub mod flow_planner;
pub mod job_service;
pub mod ownership;
pub mod retry_policy;
pub mod run_guard;
pub mod trigger_scheduler;

pub use execute_service::{DispatchHandle, ExecuteService};
pub use flow_planner::{ExecutionPlan, ExecutionStep, FlowPlanner};
pub use job_service::JobService;
pub use retry_policy::RetryPolicy;
pub use run_guard::{RunGuard, RunPermit};
pub use trigger_scheduler::{TriggerHandler, TriggerRegistry, TriggerScheduler, TriggerSync};
