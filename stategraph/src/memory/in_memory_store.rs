use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::memory::store::{Namespace, Store, StoreError, StoreSearchHit};

/// In-memory [`Store`] backed by a concurrent map. Data is lost on drop.
///
/// **Interaction**: Used as `Arc<dyn Store>` and shared across runs, so that
/// sessions keep their memory between invocations.
#[derive(Default)]
pub struct InMemoryStore {
    data: DashMap<(String, String), Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ns_key(namespace: &Namespace) -> String {
        namespace.join("\u{1f}")
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, namespace: &Namespace, key: &str, value: &Value) -> Result<(), StoreError> {
        self.data
            .insert((Self::ns_key(namespace), key.to_string()), value.clone());
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .data
            .get(&(Self::ns_key(namespace), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError> {
        self.data.remove(&(Self::ns_key(namespace), key.to_string()));
        Ok(())
    }

    async fn list(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        let ns = Self::ns_key(namespace);
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| entry.key().0 == ns)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<StoreSearchHit>, StoreError> {
        let ns = Self::ns_key(namespace);
        let limit = limit.unwrap_or(10);
        let mut hits: Vec<StoreSearchHit> = self
            .data
            .iter()
            .filter(|entry| entry.key().0 == ns)
            .filter(|entry| match query {
                Some(q) if !q.is_empty() => {
                    entry.key().1.contains(q) || entry.value().to_string().contains(q)
                }
                _ => true,
            })
            .map(|entry| StoreSearchHit {
                key: entry.key().1.clone(),
                value: entry.value().clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        hits.truncate(limit);
        Ok(hits)
    }
}
