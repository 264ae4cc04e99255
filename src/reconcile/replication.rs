//! Post-create consistency wait
//!
//! A freshly created object is not immediately readable everywhere. After a
//! create, the reconciler polls a read until the object shows up.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Capped exponential backoff bounded by an overall timeout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicationPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub timeout: Duration,
}

impl Default for ReplicationPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl ReplicationPolicy {
    /// Delay before poll number `attempt + 1`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = self.initial.as_secs_f64() * factor;
        if secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Poll `read` until it succeeds.
///
/// `NotFound` keeps polling; any other error is returned at once. No poll is
/// started at or after the deadline, and a poll still running when it passes
/// is abandoned; either way the wait ends with [`Error::ReplicationTimeout`].
/// Cancellation interrupts both polls and sleeps with [`Error::Cancelled`].
pub async fn wait_for_replication<T, F, Fut>(
    policy: &ReplicationPolicy,
    cancel: &CancellationToken,
    what: &str,
    id: &str,
    mut read: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let cancelled = || Error::Cancelled {
        operation: format!("waiting for {what} {id:?}"),
    };
    let timed_out = || {
        tracing::warn!("Gave up waiting for {} {} after {:?}", what, id, policy.timeout);
        Error::ReplicationTimeout {
            what: what.to_string(),
            id: id.to_string(),
            timeout: policy.timeout,
        }
    };
    let deadline = Instant::now() + policy.timeout;
    let mut attempt = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            polled = tokio::time::timeout_at(deadline, read()) => match polled {
                Ok(result) => result,
                Err(_) => return Err(timed_out()),
            },
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!("{} {} visible after {} retries", what, id, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let delay = policy.delay(attempt);
        if Instant::now() + delay >= deadline {
            return Err(timed_out());
        }

        tracing::warn!("{} {} not visible yet, retrying in {:?}", what, id, delay);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_capped() {
        let policy = ReplicationPolicy {
            initial: Duration::from_millis(125),
            max: Duration::from_secs(1),
            multiplier: 2.0,
            timeout: Duration::from_secs(30),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(125));
        assert_eq!(policy.delay(1), Duration::from_millis(250));
        assert_eq!(policy.delay(2), Duration::from_millis(500));
        assert_eq!(policy.delay(3), Duration::from_secs(1));
        assert_eq!(policy.delay(1000), Duration::from_secs(1));
    }

    #[test]
    fn test_multiplier_below_one_never_shrinks() {
        let policy = ReplicationPolicy {
            multiplier: 0.5,
            ..ReplicationPolicy::default()
        };
        assert_eq!(policy.delay(5), policy.initial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_abort() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let result: Result<()> = wait_for_replication(
            &ReplicationPolicy::default(),
            &cancel,
            "user",
            "u1",
            || {
                calls += 1;
                async {
                    Err(Error::UnexpectedStatus {
                        operation: "GET users/u1".to_string(),
                        status: 500,
                        body: String::new(),
                    })
                }
            },
        )
        .await;

        assert!(matches!(result, Err(Error::UnexpectedStatus { status: 500, .. })));
        assert_eq!(calls, 1);
    }
}
