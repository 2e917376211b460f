use async_trait::async_trait;
use tracing::warn;

use jobflow_core::{models::FailureNotice, traits::Notifier, SchedulerResult};

/// 把失败告警写入日志
///
/// 短信和邮件网关不在本服务内，部署时可以替换为对接网关的实现。
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &FailureNotice) -> SchedulerResult<()> {
        warn!(
            event = "job_failure_notice",
            job.id = notice.job_id,
            job.name = %notice.job_name,
            run.id = %notice.run_id,
            notice.mobiles = ?notice.mobiles,
            notice.email = ?notice.email_address,
            "{}",
            notice.message
        );
        Ok(())
    }
}
