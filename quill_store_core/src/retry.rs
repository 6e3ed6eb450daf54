//! Retry policies, looked up by RPC method name.

use std::collections::HashMap;
use std::time::Duration;

use crate::status::StatusCode;

/// The method name of the batch write RPC.
pub const BATCH_WRITE: &str = "BatchWrite";

/// Retry configuration for one RPC method: which status codes are transient
/// and how to back off between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Status codes eligible for automatic resend.
    pub retryable_codes: Vec<StatusCode>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Growth factor applied to the delay after each retry.
    pub delay_multiplier: f64,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn is_retryable(&self, code: StatusCode) -> bool {
        self.retryable_codes.contains(&code)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retryable_codes: vec![
                StatusCode::Aborted,
                StatusCode::Unavailable,
                StatusCode::ResourceExhausted,
            ],
            initial_delay: Duration::from_secs(1),
            delay_multiplier: 1.5,
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

/// Maps an RPC method name to its retry policy, falling back to a default
/// policy for methods with no explicit configuration.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyLookup {
    overrides: HashMap<String, RetryPolicy>,
    default: RetryPolicy,
}

impl RetryPolicyLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the fallback policy.
    pub fn with_default(mut self, policy: RetryPolicy) -> Self {
        self.default = policy;
        self
    }

    /// Set the policy for a specific method.
    pub fn with_method(mut self, method: impl Into<String>, policy: RetryPolicy) -> Self {
        self.overrides.insert(method.into(), policy);
        self
    }

    /// The policy for the given method.
    pub fn policy_for(&self, method: &str) -> &RetryPolicy {
        self.overrides.get(method).unwrap_or(&self.default)
    }
}
