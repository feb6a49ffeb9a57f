//! Durable state for the DocBridge background host.
//!
//! The host process can be killed between any two operations, so everything
//! the connect flow needs to resume lives here rather than in memory:
//! - **`FileStore`**: one JSON file per key under `~/.docbridge/state`
//! - **`MemoryStore`**: process-local, for tests and ephemeral hosts
//! - **`StateStore`**: typed records on top of either backend

mod file_store;
mod keys;
mod memory;
mod records;
mod state_store;
mod traits;

pub use file_store::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use records::{
    now_millis, ConnectState, ConnectStatePatch, ConnectStatus, ConnectTimestamps,
    CredentialRecord,
};
pub use state_store::StateStore;
pub use traits::DurableStore;

use bridge_config_and_utils::Paths;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key cannot be mapped onto the backend
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Stored value could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default file-backed storage under the host's state directory.
pub fn create_storage(paths: &Paths) -> StorageResult<Arc<dyn DurableStore>> {
    let store = FileStore::open(paths.state_dir())?;
    Ok(Arc::new(store))
}

/// Create a StateStore over the default file-backed storage.
pub fn create_state_store(paths: &Paths) -> StorageResult<StateStore> {
    Ok(StateStore::new(create_storage(paths)?))
}
