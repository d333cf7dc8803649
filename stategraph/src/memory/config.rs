//! Run config: run id, step limit and cancellation token.
//!
//! Passed to `CompiledStateGraph::invoke`, `stream` and `resume_with_config`.

use tokio_util::sync::CancellationToken;

/// Default round limit.
pub const DEFAULT_MAX_STEPS: u64 = 25;

/// Config for a single run.
///
/// **Interaction**: `run_id` keys the checkpoint when the run suspends; when
/// unset a UUID is generated. `cancel` is checked before every round.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: Option<String>,
    /// Maximum number of rounds; the run fails with `StepLimitExceeded` beyond it.
    pub max_steps: u64,
    pub cancel: CancellationToken,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: None,
            max_steps: DEFAULT_MAX_STEPS,
            cancel: CancellationToken::new(),
        }
    }
}

impl RunConfig {
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The configured run id, or a fresh UUID.
    pub(crate) fn resolve_run_id(&self) -> String {
        self.run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}
