//! Session store: cross-run key-value memory.
//!
//! Injected into a graph with `StateGraph::with_store` and reached by nodes
//! through `RunContext::store`. Entries are isolated by [`Namespace`], e.g.
//! `["sessions", session_id]`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Namespace path isolating a group of keys.
pub type Namespace = Vec<String>;

/// Session store error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("store serialization: {0}")]
    Serialization(String),
    #[error("store storage: {0}")]
    Storage(String),
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSearchHit {
    pub key: String,
    pub value: Value,
}

/// Key-value store keyed by namespace and key.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, namespace: &Namespace, key: &str, value: &Value) -> Result<(), StoreError>;

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Value>, StoreError>;

    /// Removes a key; missing keys are not an error.
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError>;

    /// Keys in `namespace`, sorted.
    async fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError>;

    /// Entries whose key or serialized value contains `query` (all when `None`),
    /// sorted by key, at most `limit` (default 10).
    async fn search(
        &self,
        namespace: &Namespace,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<StoreSearchHit>, StoreError>;
}
