//! In-memory checkpoint store; the default for `StateGraph::compile`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::checkpoint::RunRecord;
use super::checkpointer::{CheckpointError, CheckpointStore};
use super::serializer::{JsonSerializer, Serializer};

/// Keeps serialized run records in a map. Not durable across processes.
///
/// Records are stored as bytes so every `load` is a real deserialization and
/// later mutation of the engine's copy cannot leak into the stored one.
pub struct MemoryCheckpointStore {
    records: RwLock<HashMap<String, Slot>>,
    serializer: Box<dyn Serializer>,
}

struct Slot {
    bytes: Vec<u8>,
    claimed: bool,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::with_serializer(Box::new(JsonSerializer))
    }

    pub fn with_serializer(serializer: Box<dyn Serializer>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            serializer,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, run_id: &str, record: &RunRecord) -> Result<(), CheckpointError> {
        let bytes = self.serializer.serialize(record)?;
        self.records.write().await.insert(
            run_id.to_string(),
            Slot {
                bytes,
                claimed: false,
            },
        );
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<RunRecord, CheckpointError> {
        let guard = self.records.read().await;
        let slot = guard
            .get(run_id)
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        self.serializer.deserialize(&slot.bytes)
    }

    async fn claim(&self, run_id: &str) -> Result<RunRecord, CheckpointError> {
        let mut guard = self.records.write().await;
        let slot = guard
            .get_mut(run_id)
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        if slot.claimed {
            return Err(CheckpointError::Claimed(run_id.to_string()));
        }
        let record = self.serializer.deserialize(&slot.bytes)?;
        slot.claimed = true;
        Ok(record)
    }

    async fn unclaim(&self, run_id: &str) -> Result<(), CheckpointError> {
        if let Some(slot) = self.records.write().await.get_mut(run_id) {
            slot.claimed = false;
        }
        Ok(())
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.records.write().await.remove(run_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
