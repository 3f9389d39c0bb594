use anyhow::Result;
use async_trait::async_trait;

/// Revisioned key-value metadata store.
///
/// Revisions are monotonically increasing per store; `compare_and_swap`
/// guards read-modify-write cycles against concurrent editors. Readers
/// poll; there is no change-notification surface.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>, ttl_ms: Option<u64>) -> Result<u64>;
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>>;
    async fn delete(&self, key: &str) -> Result<u64>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>, u64)>>;

    /// Write `value` only if the key's current revision is
    /// `expected_revision` (0 for "must not exist"). Returns whether the
    /// swap happened and the resulting (or current, on failure) revision.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)>;
}
