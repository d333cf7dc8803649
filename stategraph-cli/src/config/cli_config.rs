//! Driver config: step budget and report location. Filled from env / .env.

use std::path::{Path, PathBuf};

use stategraph::{RunConfig, DEFAULT_MAX_STEPS};

use super::RunOptions;

/// Error type used by the CLI.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Driver config. Built by [`CliConfig::from_env`], then overridden with
/// [`CliConfig::apply_options`].
#[derive(Clone, Debug, PartialEq)]
pub struct CliConfig {
    /// Round budget for each run. Default: 25.
    pub max_steps: u64,
    /// Directory receiving `<run_id>.json` reports when no explicit report path is set.
    pub report_dir: Option<PathBuf>,
    /// Explicit report file (`--report`).
    pub report_path: Option<PathBuf>,
    pub run_id: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            report_dir: None,
            report_path: None,
            run_id: None,
        }
    }
}

impl CliConfig {
    /// Reads `STATEGRAPH_MAX_STEPS` and `STATEGRAPH_REPORT_DIR`.
    ///
    /// Does not load `.env`; callers do that first. A non-numeric or zero
    /// `STATEGRAPH_MAX_STEPS` is an error.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("STATEGRAPH_MAX_STEPS") {
            let max_steps: u64 = raw
                .trim()
                .parse()
                .map_err(|e| format!("STATEGRAPH_MAX_STEPS must be a positive integer, got '{}': {}", raw, e))?;
            if max_steps == 0 {
                return Err("STATEGRAPH_MAX_STEPS must be at least 1".into());
            }
            config.max_steps = max_steps;
        }
        if let Ok(dir) = std::env::var("STATEGRAPH_REPORT_DIR") {
            if !dir.trim().is_empty() {
                config.report_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(config)
    }

    /// Apply optional overrides from `RunOptions`. Only set fields override.
    pub fn apply_options(&mut self, options: &RunOptions) {
        if let Some(n) = options.max_steps {
            self.max_steps = n;
        }
        if let Some(path) = &options.report {
            self.report_path = Some(path.clone());
        }
        if let Some(id) = &options.run_id {
            self.run_id = Some(id.clone());
        }
    }

    /// Engine config for a run.
    pub fn run_config(&self) -> RunConfig {
        let config = RunConfig::default().with_max_steps(self.max_steps);
        match &self.run_id {
            Some(id) => config.with_run_id(id.clone()),
            None => config,
        }
    }

    /// Where to write the report of `run_id`: the explicit path, else
    /// `<report_dir>/<run_id>.json`, else nowhere.
    pub fn report_target(&self, run_id: &str) -> Option<PathBuf> {
        self.report_path.clone().or_else(|| {
            self.report_dir
                .as_deref()
                .map(|dir: &Path| dir.join(format!("{}.json", run_id)))
        })
    }
}
