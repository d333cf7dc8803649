//! Checkpoint store interface and errors.

use async_trait::async_trait;
use thiserror::Error;

use super::checkpoint::RunRecord;

/// Checkpoint store error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CheckpointError {
    /// No record is stored for the run id.
    #[error("no checkpoint for run '{0}'")]
    NotFound(String),

    /// Record could not be encoded or decoded.
    #[error("checkpoint serialization: {0}")]
    Serialization(String),

    /// The backing storage failed.
    #[error("checkpoint storage: {0}")]
    Storage(String),

    /// Another resume holds the claim on this run's record.
    #[error("checkpoint for run '{0}' is claimed by another resume")]
    Claimed(String),
}

/// Persists suspended runs. Single writer per run id.
///
/// **Interaction**: The engine calls `save` on suspension, `claim` on resume,
/// `unclaim` when a resume is rejected, and `delete` once a resumed run
/// completes or fails. Every compiled graph sharing a store sees the same
/// claims, so a run is resumed at most once at a time.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stores `record`, replacing any earlier record for `run_id` and
    /// dropping its claim.
    async fn save(&self, run_id: &str, record: &RunRecord) -> Result<(), CheckpointError>;

    /// Returns the record or `CheckpointError::NotFound`. Ignores claims.
    async fn load(&self, run_id: &str) -> Result<RunRecord, CheckpointError>;

    /// Atomically loads the record and marks it claimed.
    ///
    /// A record that is already claimed yields `CheckpointError::Claimed`.
    async fn claim(&self, run_id: &str) -> Result<RunRecord, CheckpointError>;

    /// Drops the claim, leaving the record untouched.
    async fn unclaim(&self, run_id: &str) -> Result<(), CheckpointError>;

    /// Removes the record and its claim. Missing records are not an error.
    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError>;

    /// Run ids with a stored record.
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
}
