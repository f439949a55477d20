//! Durable key-value storage port.

use async_trait::async_trait;

use super::StoreError;

/// Byte-oriented persistent map used for background job records.
///
/// Keys are short identifiers (`[A-Za-z0-9_-]`). A `put` must be atomic: a
/// concurrent reader sees either the old or the new value, never a torn one.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
