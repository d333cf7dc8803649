//! Serializer for run records (record <-> bytes).

use crate::memory::checkpoint::RunRecord;
use crate::memory::checkpointer::CheckpointError;

/// Serializes and deserializes run records for checkpoint storage.
pub trait Serializer: Send + Sync {
    fn serialize(&self, record: &RunRecord) -> Result<Vec<u8>, CheckpointError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<RunRecord, CheckpointError>;
}

/// JSON-based serializer.
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, record: &RunRecord) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec(record).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<RunRecord, CheckpointError> {
        serde_json::from_slice(bytes).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }
}
