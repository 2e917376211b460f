use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use jobflow_core::{
    traits::{AgentDirectory, AgentTransport, JobStore, Notifier},
    AppConfig,
};
use jobflow_dispatcher::{
    ExecuteService, FlowPlanner, JobService, RetryPolicy, RunGuard, TriggerHandler,
    TriggerScheduler,
};
use jobflow_infrastructure::{
    HttpAgentTransport, InMemoryAgentDirectory, InMemoryJobStore, LogNotifier, MetricsCollector,
    SeedData,
};

/// 主应用程序
pub struct Application {
    config: AppConfig,
    triggers: Arc<TriggerScheduler>,
    executor: ExecuteService,
    job_service: Arc<JobService>,
    run_guard: Arc<RunGuard>,
}

impl Application {
    /// 按配置创建应用：加载启动数据，使用HTTP与执行器通信
    pub fn new(config: AppConfig) -> Result<Self> {
        let (store, agents) = match &config.store.seed_file {
            Some(path) => SeedData::load(path)?.into_stores(),
            None => {
                warn!("未配置启动数据文件，使用空的作业存储");
                (InMemoryJobStore::new(), InMemoryAgentDirectory::new())
            }
        };
        let transport = HttpAgentTransport::new(&config.agent).context("创建执行器HTTP客户端失败")?;

        Ok(Self::with_components(
            config,
            Arc::new(store),
            Arc::new(agents),
            Arc::new(transport),
            Arc::new(LogNotifier),
        ))
    }

    /// 使用给定的存储、传输和通知实现组装应用
    pub fn with_components(
        config: AppConfig,
        job_store: Arc<dyn JobStore>,
        agents: Arc<dyn AgentDirectory>,
        transport: Arc<dyn AgentTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let run_guard = Arc::new(RunGuard::new());

        let triggers = Arc::new(TriggerScheduler::new(
            Arc::clone(&job_store),
            Arc::clone(&metrics),
            Duration::from_secs(config.dispatcher.idle_poll_seconds),
        ));
        let executor = ExecuteService::new(
            Arc::clone(&job_store),
            Arc::new(FlowPlanner::new(Arc::clone(&agents))),
            transport,
            notifier,
            Arc::clone(&run_guard),
            metrics,
            RetryPolicy::from_config(&config.dispatcher),
        );
        let job_service = Arc::new(JobService::new(
            job_store,
            agents,
            Arc::clone(&triggers),
            executor.clone(),
        ));

        Self {
            config,
            triggers,
            executor,
            job_service,
            run_guard,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn job_service(&self) -> Arc<JobService> {
        Arc::clone(&self.job_service)
    }

    pub fn triggers(&self) -> Arc<TriggerScheduler> {
        Arc::clone(&self.triggers)
    }

    /// 运行应用程序，直到收到关闭信号且正在进行的运行全部结束
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.dispatcher.enabled {
            let count = self.triggers.init_triggers().await.context("加载触发器失败")?;
            info!("已加载 {} 个触发器，启动定时循环", count);

            let handler: Arc<dyn TriggerHandler> = Arc::new(self.executor.clone());
            Arc::clone(&self.triggers).run(handler, shutdown_rx).await;
        } else {
            info!("定时调度已禁用，仅接受手动执行");
            let _ = shutdown_rx.recv().await;
        }

        self.drain_running_jobs().await;
        info!("应用程序已停止");
        Ok(())
    }

    /// 等待正在进行的作业运行结束
    async fn drain_running_jobs(&self) {
        loop {
            let running = self.run_guard.running_jobs();
            if running.is_empty() {
                return;
            }
            info!("等待 {} 个正在运行的作业结束", running.len());
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}
