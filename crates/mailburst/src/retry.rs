//! Retry policy with exponential backoff.
//!
//! Failures are classified by their rendered message. Transport trouble
//! (refused or reset connections, timeouts, DNS and TLS failures) is retried;
//! rejected messages and credentials are not.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::Error;

/// Default number of attempts per message.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound on the delay between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Default backoff growth factor.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Failure fragments that are always worth another attempt. Checked first.
const RETRYABLE: &[&str] = &[
    "connection refused",
    "timeout",
    "timed out",
    "temporary failure",
    "network unreachable",
    "tls handshake failed",
    "connection reset",
    "server busy",
    "failed to dial",
    "no such host",
    "failed to lookup address",
];

/// Failure fragments that will not go away by trying again.
const NON_RETRYABLE: &[&str] = &[
    "invalid sender format",
    "invalid recipient format",
    "validation failed",
    "authentication failed",
    "invalid credentials",
    "535",
    "550",
];

/// Decides whether a failed attempt should be retried.
///
/// Matching is a case-insensitive substring search over the rendered error.
/// Retryable fragments win over non-retryable ones; anything unrecognised is
/// retried.
#[must_use]
pub fn should_retry(error: &(impl Display + ?Sized)) -> bool {
    let text = error.to_string().to_lowercase();

    if RETRYABLE.iter().any(|fragment| text.contains(fragment)) {
        return true;
    }

    !NON_RETRYABLE.iter().any(|fragment| text.contains(fragment))
}

/// How many times to attempt a message and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (not re-attempts). Zero disables retry at
    /// the pool level; a policy always makes at least one attempt.
    pub max_retries: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any delay.
    pub max_backoff: Duration,
    /// Factor applied to the delay after each wait.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

/// Result of [`RetryPolicy::send_with_retry`].
#[derive(Debug)]
pub struct RetryOutcome {
    /// `Ok` if an attempt succeeded, otherwise the wrapped last error.
    pub result: Result<(), Error>,
    /// Attempts actually made.
    pub attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy with the default multiplier.
    #[must_use]
    pub const fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }

    /// Returns true if this policy allows more than a single plain attempt.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Returns the delay schedule of this policy.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_backoff, self.max_backoff, self.multiplier)
    }

    /// Runs `send` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` attempts have been made.
    ///
    /// `send` receives the 1-based attempt number.
    pub async fn send_with_retry<F, Fut>(&self, mut send: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = mailburst_smtp::Result<()>>,
    {
        let max_attempts = self.max_retries.max(1);
        let mut delays = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match send(attempt).await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(()),
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            tracing::warn!(attempt, max_attempts, error = %error, "attempt failed");

            if attempt >= max_attempts {
                return exhausted(attempt, error);
            }
            if !should_retry(&error) {
                tracing::debug!(attempt, "error is not retryable");
                return exhausted(attempt, error);
            }

            let delay = delays.next().unwrap_or(self.max_backoff);
            tracing::debug!(attempt, ?delay, "backing off");
            tokio::time::sleep(delay).await;
        }
    }
}

const fn exhausted(attempts: u32, source: mailburst_smtp::Error) -> RetryOutcome {
    RetryOutcome {
        result: Err(Error::RetriesExhausted { attempts, source }),
        attempts,
    }
}

/// Endless iterator over backoff delays: `initial`, `initial * multiplier`,
/// ... each capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    /// Creates a schedule.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            next: initial,
            max,
            multiplier,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next.min(self.max);
        // Delays never shrink; unrepresentable products fall back to the cap.
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.clamp(current, self.max));
        Some(current)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    use mailburst_smtp::{Reply, ReplyCode, Stage, ValidationError};
    use proptest::prelude::*;

    use super::*;

    fn refused() -> mailburst_smtp::Error {
        mailburst_smtp::Error::Connect {
            addr: "smtp.example.com:465".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
    }

    fn auth_failed() -> mailburst_smtp::Error {
        mailburst_smtp::Error::UnexpectedReply {
            stage: Stage::Authenticated,
            expected: ReplyCode::AUTH_SUCCESS,
            reply: Reply::new(ReplyCode::AUTH_FAILED, vec!["5.7.8 rejected".into()]),
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn classifies_transport_failures_as_retryable() {
        assert!(should_retry(&refused()));
        assert!(should_retry("dial tcp: i/o timeout"));
        assert!(should_retry("read: Connection reset by peer"));
        assert!(should_retry("TLS handshake failed: bad record"));
        assert!(should_retry("421 server busy, try later"));
        assert!(should_retry(&mailburst_smtp::Error::Timeout {
            stage: Stage::GreetingReceived,
            after: secs(60),
        }));
    }

    #[test]
    fn classifies_rejections_as_final() {
        assert!(!should_retry(&auth_failed()));
        assert!(!should_retry(&mailburst_smtp::Error::from(
            ValidationError::InvalidRecipient("bob".into())
        )));
        assert!(!should_retry("550 mailbox unavailable"));
        assert!(!should_retry("Invalid Credentials"));
    }

    #[test]
    fn retryable_fragment_wins() {
        assert!(should_retry("550 timeout while relaying"));
        assert!(should_retry("authentication failed: connection refused"));
    }

    #[test]
    fn unknown_errors_are_retried() {
        assert!(should_retry("something odd happened"));
        assert!(should_retry(""));
    }

    #[test]
    fn backoff_schedule_doubles_up_to_cap() {
        let delays: Vec<Duration> = Backoff::new(secs(1), secs(60), 2.0).take(8).collect();
        assert_eq!(
            delays,
            vec![secs(1), secs(2), secs(4), secs(8), secs(16), secs(32), secs(60), secs(60)]
        );
    }

    #[test]
    fn backoff_caps_initial_delay() {
        let mut delays = Backoff::new(secs(90), secs(30), 2.0);
        assert_eq!(delays.next(), Some(secs(30)));
        assert_eq!(delays.next(), Some(secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let outcome = RetryPolicy::new(5, secs(1), secs(60))
            .send_with_retry(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { if attempt < 3 { Err(refused()) } else { Ok(()) } }
            })
            .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Waited 1s then 2s.
        assert_eq!(start.elapsed(), secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn reports_actual_attempts_when_exhausted() {
        let outcome = RetryPolicy::new(3, secs(1), secs(60))
            .send_with_retry(|_| async { Err(refused()) })
            .await;

        assert_eq!(outcome.attempts, 3);
        let err = outcome.result.unwrap_err();
        assert!(err.to_string().starts_with("failed after 3 attempts: failed to dial"));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_non_retryable_error() {
        let start = tokio::time::Instant::now();
        let outcome = RetryPolicy::new(5, secs(1), secs(60))
            .send_with_retry(|_| async { Err(auth_failed()) })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        let err = outcome.result.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 1, .. }));
        assert!(err.to_string().contains("535"));
    }

    #[tokio::test]
    async fn zero_max_retries_still_attempts_once() {
        let outcome = RetryPolicy::new(0, secs(1), secs(60))
            .send_with_retry(|_| async { Ok(()) })
            .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.attempts, 1);
    }

    proptest! {
        #[test]
        fn backoff_never_exceeds_cap(
            initial_ms in 0u64..120_000,
            max_ms in 1u64..120_000,
            multiplier in 1.0f64..10.0,
            steps in 1usize..64,
        ) {
            let max = Duration::from_millis(max_ms);
            let delays = Backoff::new(Duration::from_millis(initial_ms), max, multiplier);

            let mut previous = Duration::ZERO;
            for delay in delays.take(steps) {
                prop_assert!(delay <= max);
                prop_assert!(delay >= previous);
                previous = delay;
            }
        }
    }
}
