//! Admission control for outgoing batches.
//!
//! A token bucket protects the backend from bursts out of a freshly created
//! writer: the allowed throughput starts low and multiplies at a fixed
//! interval until it reaches a ceiling, so sustained well-behaved callers
//! ramp up to full speed.

use std::time::Duration;

use tokio::time::Instant;

/// The outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The batch may be sent now.
    Admitted,
    /// Not enough tokens; check again after the given delay.
    RetryAfter(Duration),
}

/// Tuning knobs for the rate limiter.
///
/// The defaults are conservative starting values, not a contract: callers
/// with known backend capacity should tune them.
#[derive(Debug, Clone)]
pub struct RateLimiterOptions {
    /// Operations per second allowed when the writer is created.
    pub initial_ops_per_second: f64,
    /// Ceiling the ramp-up never exceeds.
    pub max_ops_per_second: f64,
    /// How often the allowed rate is increased.
    pub ramp_interval: Duration,
    /// Factor applied to the allowed rate at each increase.
    pub ramp_multiplier: f64,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            initial_ops_per_second: 500.0,
            max_ops_per_second: 10_000.0,
            ramp_interval: Duration::from_secs(5 * 60),
            ramp_multiplier: 1.5,
        }
    }
}

/// Token-bucket rate limiter with time-based ramp-up.
///
/// Owned by a single writer; concurrent sends of that writer share it behind
/// a mutex so the check-and-consume is atomic. Clocked on the tokio timer so
/// paused-clock tests drive it deterministically.
#[derive(Debug)]
pub struct RateLimiter {
    ops_per_second: f64,
    max_ops_per_second: f64,
    ramp_interval: Duration,
    ramp_multiplier: f64,
    tokens: f64,
    last_refill: Instant,
    last_ramp: Instant,
}

impl RateLimiter {
    pub fn new(options: RateLimiterOptions) -> Self {
        let now = Instant::now();
        let ops_per_second = options
            .initial_ops_per_second
            .min(options.max_ops_per_second)
            .max(1.0);

        Self {
            ops_per_second,
            max_ops_per_second: options.max_ops_per_second.max(1.0),
            // A zero interval would keep the catch-up loop from making
            // progress.
            ramp_interval: options.ramp_interval.max(Duration::from_millis(1)),
            ramp_multiplier: options.ramp_multiplier.max(1.0),
            tokens: ops_per_second,
            last_refill: now,
            last_ramp: now,
        }
    }

    /// The currently allowed throughput, in operations per second.
    pub fn ops_per_second(&self) -> f64 {
        self.ops_per_second
    }

    /// Check whether `count` operations may be sent now.
    ///
    /// Either consumes `count` tokens or returns the delay after which the
    /// check should be repeated. A batch is never admitted partially.
    pub fn try_admit(&mut self, count: u32) -> Admission {
        self.ramp_up();
        self.refill();

        let needed = f64::from(count);

        if needed <= self.tokens {
            self.tokens -= needed;
            return Admission::Admitted;
        }

        // A batch larger than one second's allowance can never accumulate
        // enough tokens. Admit it from a full bucket and let the balance go
        // negative; later batches absorb the debt.
        if needed > self.ops_per_second && self.tokens >= self.ops_per_second {
            self.tokens -= needed;
            return Admission::Admitted;
        }

        let deficit = needed.min(self.ops_per_second) - self.tokens;
        let delay = Duration::from_secs_f64(deficit / self.ops_per_second);
        Admission::RetryAfter(delay.max(Duration::from_millis(1)))
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.ops_per_second).min(self.ops_per_second);
        self.last_refill = now;
    }

    fn ramp_up(&mut self) {
        let now = Instant::now();
        while now.duration_since(self.last_ramp) >= self.ramp_interval {
            self.ops_per_second =
                (self.ops_per_second * self.ramp_multiplier).min(self.max_ops_per_second);
            self.last_ramp += self.ramp_interval;
        }
    }
}
