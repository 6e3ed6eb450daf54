use std::time::Duration;

use async_trait::async_trait;

use quill_store_core::RetryPolicy;

/// Pluggable sleep primitive.
///
/// Both rate-limiter admission waits and RPC retry backoff sleep through
/// this trait, so tests can substitute a recording or zero-delay
/// implementation instead of the wall clock.
#[async_trait]
pub trait Delay: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Exponential backoff schedule derived from a retry policy.
#[derive(Debug)]
pub struct ExponentialBackoff {
    next_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            next_delay: policy.initial_delay.min(policy.max_delay),
            multiplier: policy.delay_multiplier.max(1.0),
            max_delay: policy.max_delay,
        }
    }

    /// The delay to apply before the next retry.
    ///
    /// Each call returns the current delay and grows the schedule by the
    /// multiplier, capped at the policy's maximum delay.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next_delay;
        let grown = self.next_delay.as_secs_f64() * self.multiplier;
        self.next_delay = Duration::from_secs_f64(grown).min(self.max_delay);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial: Duration, multiplier: f64, max: Duration) -> RetryPolicy {
        RetryPolicy {
            initial_delay: initial,
            delay_multiplier: multiplier,
            max_delay: max,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_schedule_grows_and_caps() {
        let policy = policy(Duration::from_secs(1), 2.0, Duration::from_secs(4));
        let mut backoff = ExponentialBackoff::new(&policy);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn test_initial_delay_clamped_to_max() {
        let policy = policy(Duration::from_secs(10), 2.0, Duration::from_secs(3));
        let mut backoff = ExponentialBackoff::new(&policy);

        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
    }
}
