use std::time::Duration;

/// Why an upstream attempt failed in a way worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    /// HTTP 202: the upstream accepted the request but is still preparing
    /// the response (BGG does this while it warms its export).
    StillProcessing,
    TimedOut,
}

/// Named retry schedule shared by the catalog and translation clients:
/// bounded attempts with a per-cause backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub still_processing_backoff: Duration,
    pub timeout_backoff: Duration,
}

impl RetryPolicy {
    pub const fn upstream() -> Self {
        Self {
            max_attempts: 3,
            still_processing_backoff: Duration::from_secs(2),
            timeout_backoff: Duration::from_secs(1),
        }
    }

    /// Delay before the next attempt, or `None` when the budget is spent.
    /// `attempt` is 1-based: after the final allowed attempt this returns
    /// `None` regardless of cause.
    pub fn next_delay(&self, attempt: u32, cause: RetryCause) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(match cause {
            RetryCause::StillProcessing => self.still_processing_backoff,
            RetryCause::TimedOut => self.timeout_backoff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_depends_on_cause() {
        let policy = RetryPolicy::upstream();
        assert_eq!(
            policy.next_delay(1, RetryCause::StillProcessing),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            policy.next_delay(1, RetryCause::TimedOut),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn budget_exhausts_after_max_attempts() {
        let policy = RetryPolicy::upstream();
        assert!(policy.next_delay(2, RetryCause::StillProcessing).is_some());
        assert_eq!(policy.next_delay(3, RetryCause::StillProcessing), None);
        assert_eq!(policy.next_delay(4, RetryCause::TimedOut), None);
    }
}
