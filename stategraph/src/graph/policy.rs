//! Per-node retry, backoff and timeout policy.

use std::time::Duration;

/// Delay before a retried node runs again.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Backoff {
    #[default]
    None,
    Fixed(Duration),
    /// `initial * factor^(failures - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => *d,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exp = failures.saturating_sub(1).min(32) as i32;
                let secs = initial.as_secs_f64() * factor.powi(exp);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

/// `{maxAttempts, backoff, fallback}` for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Node scheduled once attempts are exhausted.
    pub fallback: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
            fallback: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_fallback(mut self, node_id: impl Into<String>) -> Self {
        self.fallback = Some(node_id.into());
        self
    }
}

/// Execution policy attached to a node at registration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePolicy {
    pub retry: RetryPolicy,
    /// Per-invocation timeout; none by default.
    pub timeout: Option<Duration>,
}

impl NodePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
