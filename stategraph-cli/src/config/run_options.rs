//! Optional overrides for a workflow run (CLI args or programmatic).
//!
//! Used by [`CliConfig::apply_options`](super::CliConfig::apply_options) and
//! [`run_workflow`](crate::run_workflow).

use std::path::PathBuf;

/// Overrides for a run. Only set fields override the env-based config.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Round budget; overrides `STATEGRAPH_MAX_STEPS`.
    pub max_steps: Option<u64>,
    /// JSON object merged over the workflow's default input.
    pub state: Option<String>,
    /// JSON objects answering suspensions, consumed in order before stdin.
    pub answers: Vec<String>,
    /// Report file; takes precedence over `STATEGRAPH_REPORT_DIR`.
    pub report: Option<PathBuf>,
    /// Run id used as checkpoint key; generated when unset.
    pub run_id: Option<String>,
}
