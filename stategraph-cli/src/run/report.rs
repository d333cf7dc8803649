//! JSON run report written after a run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use stategraph::{HistoryEntry, RunResult, RunStatus};

use crate::config::Error;

/// Summary of a finished or paused run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow: String,
    pub status: RunStatus,
    pub run_id: String,
    pub state: Value,
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Node waiting for input when the run is suspended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_at: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    /// Builds the report. A suspended result carries no history; callers fill
    /// it from the checkpoint.
    pub fn from_result(workflow: &str, result: &RunResult) -> Self {
        let (history, error, suspended_at) = match result {
            RunResult::Completed(c) => (c.history.clone(), None, None),
            RunResult::Failed(f) => (f.history.clone(), Some(f.error.to_string()), None),
            RunResult::Suspended(s) => (Vec::new(), None, Some(s.node_id.clone())),
        };
        Self {
            workflow: workflow.to_string(),
            status: result.status(),
            run_id: result.run_id().to_string(),
            state: result.state().to_json(),
            history,
            error,
            suspended_at,
            generated_at: Utc::now(),
        }
    }
}

/// Writes `report` as pretty JSON, creating parent directories.
pub fn write_report(path: &Path, report: &RunReport) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}
