//! Metrics collector for the job dispatcher
//!
//! 指标通过 `metrics` 门面记录，由进程入口安装的 Prometheus exporter 导出。
//! 未安装 exporter 时所有记录都是空操作。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

pub struct MetricsCollector {
    dispatch_total: Counter,
    dispatch_failures_total: Counter,
    dispatch_retries_total: Counter,
    trigger_fires_total: Counter,
    guard_rejections_total: Counter,
    active_triggers: Gauge,
    step_duration: Histogram,
    run_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            dispatch_total: counter!("jobflow_dispatch_total"),
            dispatch_failures_total: counter!("jobflow_dispatch_failures_total"),
            dispatch_retries_total: counter!("jobflow_dispatch_retries_total"),
            trigger_fires_total: counter!("jobflow_trigger_fires_total"),
            guard_rejections_total: counter!("jobflow_guard_rejections_total"),
            active_triggers: gauge!("jobflow_active_triggers"),
            step_duration: histogram!("jobflow_step_duration_seconds"),
            run_duration: histogram!("jobflow_run_duration_seconds"),
        }
    }

    /// 记录一次完整运行的结束
    pub fn record_run(&self, success: bool, duration_seconds: f64) {
        self.dispatch_total.increment(1);
        if !success {
            self.dispatch_failures_total.increment(1);
        }
        self.run_duration.record(duration_seconds);
        debug!(success, duration_seconds, "运行指标已记录");
    }

    pub fn record_step(&self, duration_seconds: f64) {
        self.step_duration.record(duration_seconds);
    }

    pub fn record_retry(&self) {
        self.dispatch_retries_total.increment(1);
    }

    pub fn record_trigger_fire(&self) {
        self.trigger_fires_total.increment(1);
    }

    /// 同一作业已有运行在进行，本次触发被拒绝
    pub fn record_guard_rejection(&self) {
        self.guard_rejections_total.increment(1);
    }

    pub fn set_active_triggers(&self, count: usize) {
        self.active_triggers.set(count as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        let metrics = MetricsCollector::new();
        metrics.record_run(true, 0.5);
        metrics.record_run(false, 1.0);
        metrics.record_step(0.1);
        metrics.record_retry();
        metrics.record_trigger_fire();
        metrics.record_guard_rejection();
        metrics.set_active_triggers(3);
    }
}
