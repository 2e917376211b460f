//! 运行守卫
//!
//! 每个作业最多一个进行中的运行。定时触发和人工执行都必须先在这里占位，
//! 占位是原子的“抢占或拒绝”。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use jobflow_core::models::JobId;

#[derive(Debug, Clone)]
struct RunClaim {
    token: Uuid,
    claimed_at: DateTime<Utc>,
    expires_at: Option<Instant>,
}

impl RunClaim {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// 正在运行的作业快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJob {
    pub job_id: JobId,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RunGuard {
    claims: Mutex<HashMap<JobId, RunClaim>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn claims(&self) -> MutexGuard<'_, HashMap<JobId, RunClaim>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 无租约占位，成功返回 `true`
    pub fn try_acquire(&self, job_id: JobId) -> bool {
        self.try_acquire_with_lease(job_id, None).is_some()
    }

    /// 占位并返回本次占位的令牌
    ///
    /// 已有未过期的占位时返回 `None`；过期的占位直接被接管。
    /// 租约超出时钟范围时按无租约处理。
    pub fn try_acquire_with_lease(&self, job_id: JobId, lease: Option<Duration>) -> Option<Uuid> {
        let now = Instant::now();
        let mut claims = self.claims();
        if let Some(existing) = claims.get(&job_id) {
            if existing.is_live(now) {
                return None;
            }
            debug!("作业 {} 的运行占位已过期，被新的运行接管", job_id);
        }

        let token = Uuid::new_v4();
        claims.insert(
            job_id,
            RunClaim {
                token,
                claimed_at: Utc::now(),
                expires_at: lease.and_then(|lease| now.checked_add(lease)),
            },
        );
        Some(token)
    }

    /// 无条件释放
    pub fn release(&self, job_id: JobId) -> bool {
        self.claims().remove(&job_id).is_some()
    }

    /// 只在令牌匹配时释放，不会误释放接管后的新占位
    pub fn release_token(&self, job_id: JobId, token: Uuid) -> bool {
        let mut claims = self.claims();
        match claims.get(&job_id) {
            Some(claim) if claim.token == token => {
                claims.remove(&job_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self, job_id: JobId) -> bool {
        let now = Instant::now();
        self.claims()
            .get(&job_id)
            .is_some_and(|claim| claim.is_live(now))
    }

    /// 所有未过期的占位，按作业ID排序
    pub fn running_jobs(&self) -> Vec<RunningJob> {
        let now = Instant::now();
        let mut running: Vec<RunningJob> = self
            .claims()
            .iter()
            .filter(|(_, claim)| claim.is_live(now))
            .map(|(job_id, claim)| RunningJob {
                job_id: *job_id,
                claimed_at: claim.claimed_at,
            })
            .collect();
        running.sort_by_key(|r| r.job_id);
        running
    }

    /// 占位并返回许可，许可被丢弃时自动释放
    pub fn try_claim(self: &Arc<Self>, job_id: JobId, lease: Option<Duration>) -> Option<RunPermit> {
        self.try_acquire_with_lease(job_id, lease).map(|token| RunPermit {
            guard: Arc::clone(self),
            job_id,
            token,
        })
    }
}

/// 运行许可
#[derive(Debug)]
pub struct RunPermit {
    guard: Arc<RunGuard>,
    job_id: JobId,
    token: Uuid,
}

impl RunPermit {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if self.guard.release_token(self.job_id, self.token) {
            debug!("作业 {} 运行结束，释放占位", self.job_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_twice() {
        let guard = RunGuard::new();
        assert!(guard.try_acquire(1));
        assert!(!guard.try_acquire(1));
        assert!(guard.try_acquire(2));
        assert!(guard.is_running(1));

        assert!(guard.release(1));
        assert!(!guard.is_running(1));
        assert!(guard.try_acquire(1));
    }

    #[test]
    fn test_expired_lease_can_be_taken_over() {
        let guard = RunGuard::new();
        let stale = guard
            .try_acquire_with_lease(1, Some(Duration::from_millis(0)))
            .unwrap();
        assert!(!guard.is_running(1));

        let fresh = guard.try_acquire_with_lease(1, None).unwrap();
        assert!(!guard.release_token(1, stale));
        assert!(guard.is_running(1));
        assert!(guard.release_token(1, fresh));
    }

    #[test]
    fn test_lease_beyond_clock_range_never_expires() {
        let guard = RunGuard::new();
        assert!(guard.try_acquire_with_lease(3, Some(Duration::MAX)).is_some());
        assert!(guard.is_running(3));
        assert!(guard.try_acquire_with_lease(3, None).is_none());
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let guard = Arc::new(RunGuard::new());
        {
            let permit = guard.try_claim(5, None).unwrap();
            assert_eq!(permit.job_id(), 5);
            assert!(guard.try_claim(5, None).is_none());
            assert_eq!(guard.running_jobs().len(), 1);
        }
        assert!(!guard.is_running(5));
        assert!(guard.running_jobs().is_empty());
    }
}
