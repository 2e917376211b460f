#[cfg(test)]
mod run_guard_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use jobflow_dispatcher::RunGuard;

    #[test]
    fn test_try_acquire_twice() {
        let guard = RunGuard::new();
        assert!(guard.try_acquire(7));
        assert!(!guard.try_acquire(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_admit_exactly_one() {
        let guard = Arc::new(RunGuard::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let guard = guard.clone();
            tasks.push(tokio::spawn(async move { guard.try_acquire(1) }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(guard.running_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_lease_expiry_allows_takeover() {
        let guard = Arc::new(RunGuard::new());
        let stale = guard.try_claim(1, Some(Duration::from_millis(20))).unwrap();
        assert!(guard.try_claim(1, None).is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!guard.is_running(1));

        let fresh = guard.try_claim(1, None).unwrap();
        drop(stale);
        assert!(guard.is_running(1), "旧许可不能释放新的占位");
        drop(fresh);
        assert!(!guard.is_running(1));
    }
}
