//! Storage trait definitions.

use crate::StorageResult;

/// Key-value store whose contents survive host restarts.
///
/// There are no transactions across keys; callers that need a
/// read-modify-write on one key serialize it themselves.
pub trait DurableStore: Send + Sync {
    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether anything was removed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
