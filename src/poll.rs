//! Bounded polling for eventually-consistent state
//!
//! A timeout is a hard failure; there is no partial-success outcome.

use crate::clock::{elapsed, Clock};
use crate::error::{AclError, Result};
use std::time::Duration;
use tracing::debug;

/// Result of one polling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// Settled; stop polling
    Done(T),
    /// Not settled yet, with the reason reported on timeout
    Retry(String),
}

/// Run `attempt` every `interval` until it settles or `timeout` elapses.
/// Errors returned by `attempt` abort immediately. A zero `interval` is
/// rejected.
pub fn retry_with_timeout<T, F>(
    clock: &dyn Clock,
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Result<Attempt<T>>,
{
    if interval.is_zero() {
        return Err(AclError::InvalidArgument(format!(
            "polling interval for {} must be positive",
            what
        )));
    }

    let started = clock.now();
    let mut tries = 0u32;

    loop {
        tries += 1;
        let reason = match attempt()? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry(reason) => reason,
        };

        let spent = elapsed(started, clock.now());
        if spent >= timeout {
            return Err(AclError::Timeout(format!(
                "{} did not settle after {:?} ({} attempts): {}",
                what, timeout, tries, reason
            )));
        }

        debug!("{} not settled (attempt {}): {}", what, tries, reason);
        clock.sleep(interval.min(timeout - spent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_settles_after_retries() {
        let clock = ManualClock::default();
        let mut calls = 0;
        let value = retry_with_timeout(
            &clock,
            "counter",
            Duration::from_secs(60),
            Duration::from_secs(10),
            || {
                calls += 1;
                Ok(if calls == 3 {
                    Attempt::Done(calls)
                } else {
                    Attempt::Retry(format!("calls = {}", calls))
                })
            },
        )
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_times_out() {
        let clock = ManualClock::default();
        let err = retry_with_timeout::<(), _>(
            &clock,
            "never",
            Duration::from_secs(30),
            Duration::from_secs(10),
            || Ok(Attempt::Retry("still pending".into())),
        )
        .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("still pending"));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let clock = ManualClock::default();
        let mut calls = 0;
        let err = retry_with_timeout::<(), _>(
            &clock,
            "spin",
            Duration::from_secs(30),
            Duration::ZERO,
            || {
                calls += 1;
                Ok(Attempt::Retry("pending".into()))
            },
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Invalid argument"));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_errors_abort() {
        let clock = ManualClock::default();
        let mut calls = 0;
        let err = retry_with_timeout::<(), _>(
            &clock,
            "denied",
            Duration::from_secs(30),
            Duration::from_secs(10),
            || {
                calls += 1;
                Err(AclError::denied("u", "delete", "backup [b]"))
            },
        )
        .unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(calls, 1);
    }
}
