#[cfg(test)]
mod cron_utils_tests {
    use jobflow_core::models::CronType;
    use jobflow_dispatcher::cron_utils::*;

    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_cron_scheduler_creation() {
        assert!(CronScheduler::new("0 0 0 * * *", CronType::Quartz).is_ok());
        assert!(CronScheduler::new("0 0 * * *", CronType::Crontab).is_ok());
        assert!(CronScheduler::new("invalid", CronType::Quartz).is_err());
        assert!(CronScheduler::new("", CronType::Crontab).is_err());
    }

    #[test]
    fn test_first_of_month_or_monday_is_rejected() {
        let err = CronScheduler::validate_cron_expression("0 9 1 * 1", CronType::Crontab).unwrap_err();
        assert!(err.is_scheduling_error());
        assert!(CronScheduler::validate_cron_expression("0 9 1 * *", CronType::Crontab).is_ok());
        assert!(CronScheduler::validate_cron_expression("0 9 * * 1", CronType::Crontab).is_ok());
    }

    #[test]
    fn test_crontab_next_execution_time() {
        let scheduler = CronScheduler::new("30 2 * * *", CronType::Crontab).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            scheduler.next_execution_time(now),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 2, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_crontab_day_of_week_matches_calendar() {
        // 2024-01-01 是星期一
        let monday = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mondays = CronScheduler::new("0 9 * * 1", CronType::Crontab).unwrap();
        assert_eq!(
            mondays.next_execution_time(monday),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
        );

        for sunday_expr in ["0 9 * * 0", "0 9 * * 7"] {
            let sundays = CronScheduler::new(sunday_expr, CronType::Crontab).unwrap();
            assert_eq!(
                sundays.next_execution_time(monday),
                Some(Utc.with_ymd_and_hms(2024, 1, 7, 9, 0, 0).unwrap()),
                "{sunday_expr}"
            );
        }

        let weekdays = CronScheduler::new("0 9 * * 1-5", CronType::Crontab).unwrap();
        let friday_evening = Utc.with_ymd_and_hms(2024, 1, 5, 18, 0, 0).unwrap();
        assert_eq!(
            weekdays.next_execution_time(friday_evening),
            Some(Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_quartz_upcoming_times() {
        let scheduler = CronScheduler::new("0 0/15 * * * ?", CronType::Quartz).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let times = scheduler.upcoming_times(now, 3);
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 45, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_time_until_next_execution() {
        let scheduler = CronScheduler::new("0 * * * *", CronType::Crontab).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 45, 0).unwrap();
        assert_eq!(
            scheduler.time_until_next_execution(now),
            Some(Duration::minutes(15))
        );
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(CronScheduler::validate_cron_expression("*/5 * * * *", CronType::Crontab).is_ok());
        assert!(CronScheduler::validate_cron_expression("*/5 * * * *", CronType::Quartz).is_err());
        let err = CronScheduler::validate_cron_expression("bad", CronType::Crontab).unwrap_err();
        assert!(err.is_scheduling_error());
    }
}
