use std::time::Duration;

use crate::error::ClockodoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts for transport and server faults, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Used when a 429 carries no `Retry-After` hint.
    pub rate_limit_delay: Duration,
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            rate_limit_delay: Duration::from_secs(1),
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

/// What a single logical request has used up so far. Transport and server
/// faults count against `max_attempts`; a 429 gets its own single retry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub faults: u32,
    pub rate_limit_retried: bool,
}

/// Records a failed attempt in `state` and decides whether it is retried
/// and after how long.
pub fn next_delay(policy: &RetryPolicy, error: &ClockodoError, state: &mut RetryState) -> Option<Duration> {
    match error {
        ClockodoError::Transport(_) | ClockodoError::Server { .. } => {
            state.faults += 1;
            if state.faults >= policy.max_attempts {
                return None;
            }
            let factor = 2u32.saturating_pow(state.faults - 1);
            Some(policy.base_delay.saturating_mul(factor).min(policy.max_delay))
        }
        ClockodoError::RateLimited { retry_after, .. } => {
            if state.rate_limit_retried {
                return None;
            }
            state.rate_limit_retried = true;
            let wait = retry_after.unwrap_or(policy.rate_limit_delay);
            Some(wait.min(policy.max_rate_limit_wait))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntityKind;

    fn server_error() -> ClockodoError {
        ClockodoError::Server {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn server_errors_back_off_exponentially() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();
        assert_eq!(
            next_delay(&policy, &server_error(), &mut state),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            next_delay(&policy, &server_error(), &mut state),
            Some(Duration::from_millis(1000))
        );
        assert_eq!(next_delay(&policy, &server_error(), &mut state), None);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            ..RetryPolicy::default()
        };
        let err = ClockodoError::Transport("timeout".to_string());
        let mut state = RetryState {
            faults: 8,
            ..RetryState::default()
        };
        assert_eq!(next_delay(&policy, &err, &mut state), Some(policy.max_delay));
    }

    #[test]
    fn rate_limit_honours_hint_once() {
        let policy = RetryPolicy::default();
        let err = ClockodoError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
            message: "slow down".to_string(),
        };
        let mut state = RetryState::default();
        assert_eq!(next_delay(&policy, &err, &mut state), Some(Duration::from_secs(2)));
        assert_eq!(next_delay(&policy, &err, &mut state), None);
    }

    #[test]
    fn rate_limit_without_hint_uses_fixed_delay() {
        let policy = RetryPolicy::default();
        let err = ClockodoError::RateLimited {
            retry_after: None,
            message: String::new(),
        };
        assert_eq!(
            next_delay(&policy, &err, &mut RetryState::default()),
            Some(policy.rate_limit_delay)
        );
    }

    #[test]
    fn rate_limit_after_server_fault_is_still_retried() {
        let policy = RetryPolicy::default();
        let limited = ClockodoError::RateLimited {
            retry_after: None,
            message: String::new(),
        };
        let mut state = RetryState::default();
        assert!(next_delay(&policy, &server_error(), &mut state).is_some());
        assert_eq!(next_delay(&policy, &limited, &mut state), Some(policy.rate_limit_delay));
        assert_eq!(state.faults, 1);
    }

    #[test]
    fn rate_limit_does_not_use_up_fault_attempts() {
        let policy = RetryPolicy::default();
        let limited = ClockodoError::RateLimited {
            retry_after: None,
            message: String::new(),
        };
        let mut state = RetryState::default();
        assert!(next_delay(&policy, &limited, &mut state).is_some());
        assert!(next_delay(&policy, &server_error(), &mut state).is_some());
        assert!(next_delay(&policy, &server_error(), &mut state).is_some());
        assert_eq!(next_delay(&policy, &server_error(), &mut state), None);
    }

    #[test]
    fn caller_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        let errors = [
            ClockodoError::Auth {
                status: 401,
                message: String::new(),
            },
            ClockodoError::NotFound("gone".to_string()),
            ClockodoError::validation("bad"),
            ClockodoError::AlreadyRunning("running".to_string()),
            ClockodoError::AmbiguousMatch {
                kind: EntityKind::Customer,
                query: "a".to_string(),
                candidates: Vec::new(),
            },
        ];
        for err in errors {
            assert_eq!(next_delay(&policy, &err, &mut RetryState::default()), None, "{err}");
        }
    }
}
