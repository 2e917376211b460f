//! 所有权校验
//!
//! 校验失败返回 `false`，由调用方转换为 `Outcome::NotOwner`，不作为错误。

use jobflow_core::models::{Agent, CallerIdentity, Job};

/// 调用者拥有该作业，或者是管理员
pub fn check_owner(caller: &CallerIdentity, job: &Job) -> bool {
    caller.admin || job.user_id == caller.user_id
}

/// 调用者可以把作业放到该执行器上运行
pub fn can_use_agent(caller: &CallerIdentity, agent: &Agent) -> bool {
    !agent.deleted && (caller.admin || agent.is_owned_by(caller.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_owner() {
        let job = Job::new("backup".to_string(), 1, String::new(), 7);
        assert!(check_owner(&CallerIdentity::user(7), &job));
        assert!(!check_owner(&CallerIdentity::user(8), &job));
        assert!(check_owner(&CallerIdentity::admin(8), &job));
    }

    #[test]
    fn test_can_use_agent() {
        let mut agent = Agent::new(1, "db".to_string(), "127.0.0.1".to_string(), 1577);
        agent.owner_ids = vec![7];
        assert!(can_use_agent(&CallerIdentity::user(7), &agent));
        assert!(!can_use_agent(&CallerIdentity::user(8), &agent));
        assert!(can_use_agent(&CallerIdentity::admin(8), &agent));

        agent.deleted = true;
        assert!(!can_use_agent(&CallerIdentity::admin(8), &agent));
    }
}
