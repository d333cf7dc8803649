//! Node outcome: success with a delta, failure, or a request to suspend.
//!
//! Retry and fallback decisions are driven by this value rather than by
//! errors bubbling out of handlers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::{Delta, ResumeSchema};

/// Classification of a node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The handler reported a failure.
    Handler,
    /// The handler panicked.
    HandlerPanic,
    /// The handler did not finish within its timeout.
    HandlerTimeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Handler => "handler_error",
            FailureKind::HandlerPanic => "handler_panic",
            FailureKind::HandlerTimeout => "handler_timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed node invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub kind: FailureKind,
    pub detail: String,
    /// When false the retry budget is skipped and the failure escalates at once.
    pub retryable: bool,
}

impl NodeFailure {
    /// Retryable handler failure.
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Handler,
            detail: detail.into(),
            retryable: true,
        }
    }

    /// Non-retryable handler failure, e.g. bad credentials or a malformed request.
    pub fn fatal(detail: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(detail)
        }
    }

    pub(crate) fn panic(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::HandlerPanic,
            detail: detail.into(),
            retryable: true,
        }
    }

    pub(crate) fn timeout(limit: Duration) -> Self {
        Self {
            kind: FailureKind::HandlerTimeout,
            detail: format!("handler exceeded {:?}", limit),
            retryable: true,
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Result of one node invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Partial state to merge.
    Success(Delta),
    /// The invocation failed; subject to the node's retry policy.
    Failure(NodeFailure),
    /// Pause the run until external input matching `resume_schema` arrives.
    Suspend {
        reason: String,
        resume_schema: ResumeSchema,
    },
}

impl Outcome {
    pub fn success(delta: Delta) -> Self {
        Outcome::Success(delta)
    }

    /// Success without state changes.
    pub fn empty() -> Self {
        Outcome::Success(Delta::new())
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Outcome::Failure(NodeFailure::new(detail))
    }

    pub fn fatal(detail: impl Into<String>) -> Self {
        Outcome::Failure(NodeFailure::fatal(detail))
    }

    pub fn suspend(reason: impl Into<String>, resume_schema: ResumeSchema) -> Self {
        Outcome::Suspend {
            reason: reason.into(),
            resume_schema,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

impl From<Delta> for Outcome {
    fn from(delta: Delta) -> Self {
        Outcome::Success(delta)
    }
}
