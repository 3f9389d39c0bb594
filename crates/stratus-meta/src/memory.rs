use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use tokio::sync::RwLock;

use crate::types::MetaStore;

/// In-process store for tests and single-node deployments. TTLs are
/// accepted but not enforced.
#[derive(Debug, Clone)]
pub struct MemoryMetaStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    kv: BTreeMap<String, (Vec<u8>, u64)>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    fn next_revision(inner: &mut Inner) -> u64 {
        inner.revision = inner.revision.saturating_add(1);
        inner.revision
    }
}

impl Default for MemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MetaStore for MemoryMetaStore {
    async fn put(&self, key: &str, value: Vec<u8>, _ttl_ms: Option<u64>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let rev = Self::next_revision(&mut inner);
        inner.kv.insert(key.to_string(), (value, rev));
        Ok(rev)
    }

    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let inner = self.inner.read().await;
        Ok(inner.kv.get(key).map(|(v, rev)| (v.clone(), *rev)))
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.kv.remove(key);
        let rev = Self::next_revision(&mut inner);
        Ok(rev)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>, u64)>> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for (k, (v, rev)) in inner
            .kv
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            out.push((k.clone(), v.clone(), *rev));
        }
        Ok(out)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)> {
        let mut inner = self.inner.write().await;
        let current_rev = inner.kv.get(key).map(|(_, rev)| *rev).unwrap_or(0);
        if current_rev != expected_revision {
            return Ok((false, current_rev));
        }
        let rev = Self::next_revision(&mut inner);
        inner.kv.insert(key.to_string(), (value, rev));
        Ok((true, rev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = MemoryMetaStore::new();
        let rev = store.put("/t/a", b"1".to_vec(), None).await.unwrap();
        let (value, got_rev) = store.get("/t/a").await.unwrap().unwrap();
        assert_eq!(value, b"1");
        assert_eq!(got_rev, rev);

        store.delete("/t/a").await.unwrap();
        assert!(store.get("/t/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_prefix_stops_at_boundary() {
        let store = MemoryMetaStore::new();
        store.put("/t/agents/a", b"1".to_vec(), None).await.unwrap();
        store.put("/t/agents/b", b"2".to_vec(), None).await.unwrap();
        store.put("/t/sessions/x", b"3".to_vec(), None).await.unwrap();

        let agents = store.list_prefix("/t/agents/").await.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].0, "/t/agents/a");
        assert_eq!(agents[1].0, "/t/agents/b");
    }

    #[tokio::test]
    async fn cas_rejects_stale_revision() {
        let store = MemoryMetaStore::new();
        let rev = store.put("/t/p", b"v1".to_vec(), None).await.unwrap();

        let (ok, rev2) = store
            .compare_and_swap("/t/p", rev, b"v2".to_vec())
            .await
            .unwrap();
        assert!(ok);
        assert!(rev2 > rev);

        // a stale writer loses and learns the current revision
        let (ok, current) = store
            .compare_and_swap("/t/p", rev, b"v3".to_vec())
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(current, rev2);
        let (value, _) = store.get("/t/p").await.unwrap().unwrap();
        assert_eq!(value, b"v2");
    }

    #[tokio::test]
    async fn cas_with_zero_creates_only_when_absent() {
        let store = MemoryMetaStore::new();
        let (ok, _) = store
            .compare_and_swap("/t/new", 0, b"v1".to_vec())
            .await
            .unwrap();
        assert!(ok);
        let (ok, _) = store
            .compare_and_swap("/t/new", 0, b"v2".to_vec())
            .await
            .unwrap();
        assert!(!ok);
    }
}
