mod common;

#[cfg(test)]
mod trigger_scheduler_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::broadcast;

    use jobflow_core::models::{CronType, ExecType, JobId, RunModel};
    use jobflow_core::traits::JobStore;
    use jobflow_dispatcher::{TriggerHandler, TriggerSync};
    use jobflow_testing_utils::{JobBuilder, TestEnv};

    use crate::common::Harness;

    #[derive(Default)]
    struct RecordingHandler {
        fired: Mutex<Vec<JobId>>,
    }

    #[async_trait]
    impl TriggerHandler for RecordingHandler {
        async fn on_fire(&self, job_id: JobId, _scheduled_at: DateTime<Utc>) {
            self.fired.lock().unwrap().push(job_id);
        }
    }

    #[tokio::test]
    async fn test_schedule_job_gets_matching_trigger() {
        let job = JobBuilder::new()
            .with_id(1)
            .scheduled(CronType::Crontab, "30 2 * * *")
            .build();
        let harness = Harness::with_jobs(vec![job.clone()]);

        assert_eq!(harness.triggers.sync_trigger(1).await.unwrap(), TriggerSync::Created);
        assert!(harness.triggers.has_trigger(1));

        let trigger = harness.triggers.trigger(1).unwrap();
        assert_eq!(trigger.cron_exp, "30 2 * * *");
        assert_eq!(trigger.cron_type, CronType::Crontab);
        let next = harness.triggers.next_fire_time(1).unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "02:30:00");

        assert_eq!(harness.triggers.sync_trigger(1).await.unwrap(), TriggerSync::Unchanged);
    }

    #[tokio::test]
    async fn test_apply_computes_next_fire_from_given_time() {
        let job = JobBuilder::new()
            .with_id(1)
            .scheduled(CronType::Quartz, "0 0 12 * * ?")
            .build();
        let harness = Harness::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();

        harness.triggers.apply(&job, now).unwrap();
        assert_eq!(
            harness.triggers.next_fire_time(1),
            Some(Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_reschedule_and_remove_follow_job_changes() {
        let job = JobBuilder::new()
            .with_id(1)
            .scheduled(CronType::Crontab, "0 1 * * *")
            .build();
        let harness = Harness::with_jobs(vec![job.clone()]);
        harness.triggers.sync_trigger(1).await.unwrap();

        let mut changed = job.clone();
        changed.cron_exp = Some("0 3 * * *".to_string());
        harness.store.merge(&changed).await.unwrap();
        assert_eq!(harness.triggers.sync_trigger(1).await.unwrap(), TriggerSync::Rescheduled);
        assert_eq!(harness.triggers.trigger(1).unwrap().cron_exp, "0 3 * * *");

        changed.exec_type = ExecType::Operator;
        harness.store.merge(&changed).await.unwrap();
        assert_eq!(harness.triggers.sync_trigger(1).await.unwrap(), TriggerSync::Removed);
        assert!(!harness.triggers.has_trigger(1));
        assert_eq!(harness.triggers.sync_trigger(1).await.unwrap(), TriggerSync::Absent);
    }

    #[tokio::test]
    async fn test_deleted_job_has_no_trigger() {
        let job = JobBuilder::new()
            .with_id(1)
            .scheduled(CronType::Crontab, "0 1 * * *")
            .build();
        let harness = Harness::with_jobs(vec![job]);
        harness.triggers.sync_trigger(1).await.unwrap();

        harness.store.delete(1).await.unwrap();
        assert_eq!(harness.triggers.sync_trigger(1).await.unwrap(), TriggerSync::Removed);
        assert_eq!(harness.triggers.trigger_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_cron_removes_existing_trigger() {
        let job = JobBuilder::new()
            .with_id(1)
            .scheduled(CronType::Crontab, "0 1 * * *")
            .build();
        let harness = Harness::with_jobs(vec![job.clone()]);
        harness.triggers.sync_trigger(1).await.unwrap();

        let mut broken = job.clone();
        broken.cron_exp = Some("not a cron".to_string());
        harness.store.merge(&broken).await.unwrap();

        let err = harness.triggers.sync_trigger(1).await.unwrap_err();
        assert!(err.is_scheduling_error());
        assert!(!harness.triggers.has_trigger(1));

        broken.cron_exp = None;
        harness.store.merge(&broken).await.unwrap();
        assert!(harness.triggers.sync_trigger(1).await.is_err());
    }

    #[tokio::test]
    async fn test_flow_child_syncs_parent_trigger() {
        let parent = JobBuilder::new()
            .with_id(10)
            .flow_parent(RunModel::Serial)
            .scheduled(CronType::Crontab, "0 4 * * *")
            .build();
        let child = JobBuilder::new()
            .with_id(11)
            .flow_child(10, 0)
            .last_child()
            .build();
        let harness = Harness::with_jobs(vec![parent, child]);

        assert_eq!(harness.triggers.sync_trigger(11).await.unwrap(), TriggerSync::Created);
        assert!(harness.triggers.has_trigger(10));
        assert!(!harness.triggers.has_trigger(11));
    }

    #[tokio::test]
    async fn test_init_triggers_skips_broken_jobs() {
        let good = JobBuilder::new()
            .with_id(1)
            .scheduled(CronType::Crontab, "0 1 * * *")
            .build();
        let broken = JobBuilder::new()
            .with_id(2)
            .with_name("broken")
            .scheduled(CronType::Crontab, "bad")
            .build();
        let manual = JobBuilder::new().with_id(3).with_name("manual").build();
        let harness = Harness::with_jobs(vec![good, broken, manual]);

        assert_eq!(harness.triggers.init_triggers().await.unwrap(), 1);
        assert!(harness.triggers.has_trigger(1));
        assert!(!harness.triggers.has_trigger(2));
        assert!(!harness.triggers.has_trigger(3));
    }

    #[tokio::test]
    async fn test_run_loop_fires_due_triggers_and_stops_on_shutdown() {
        let job = JobBuilder::new()
            .with_id(1)
            .scheduled(CronType::Quartz, "* * * * * *")
            .build();
        let harness = Harness::with_jobs(vec![job]);
        harness.triggers.init_triggers().await.unwrap();

        let handler = Arc::new(RecordingHandler::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let loop_handle = tokio::spawn(
            harness
                .triggers
                .clone()
                .run(handler.clone() as Arc<dyn TriggerHandler>, shutdown_rx),
        );

        let fired = TestEnv::wait_for(
            || {
                let handler = handler.clone();
                async move { !handler.fired.lock().unwrap().is_empty() }
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(fired);
        assert!(handler.fired.lock().unwrap().iter().all(|id| *id == 1));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), loop_handle)
            .await
            .unwrap()
            .unwrap();
    }
}
