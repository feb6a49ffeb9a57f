//! High-level API over the durable store for the connect flow records.

use crate::{
    ConnectState, ConnectStatePatch, CredentialRecord, DurableStore, StorageError, StorageKeys,
    StorageResult,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed access to `connectState` and `credentialRecord`.
///
/// Read-modify-write cycles on `connectState` are serialized inside the
/// process, so a patch is always merged onto the latest stored value.
pub struct StateStore {
    storage: Arc<dyn DurableStore>,
    write_lock: Mutex<()>,
}

impl StateStore {
    /// Create a state store over the given storage backend.
    pub fn new(storage: Arc<dyn DurableStore>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    // ==========================================
    // Connect state
    // ==========================================

    /// Read the connect state. A missing or unreadable record reads as idle.
    pub fn read_connect_state(&self) -> StorageResult<ConnectState> {
        let Some(raw) = self.storage.get(StorageKeys::CONNECT_STATE)? else {
            return Ok(ConnectState::default());
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(error = %e, "Stored connect state is unreadable, treating as idle");
                Ok(ConnectState::default())
            }
        }
    }

    /// Merge `patch` into the stored state and persist the result.
    pub fn update_connect_state(&self, patch: &ConnectStatePatch) -> StorageResult<ConnectState> {
        let _guard = self.write_lock.lock();
        let mut state = self.read_connect_state()?;
        state.apply(patch);
        self.write_connect_state(&state)?;
        Ok(state)
    }

    /// Read-modify-write driven by `decide`, which sees the stored state and
    /// returns the patch to apply, or `None` to leave it untouched.
    ///
    /// Returns the new state when something was written.
    pub fn update_connect_state_with<F, E>(&self, decide: F) -> Result<Option<ConnectState>, E>
    where
        F: FnOnce(&ConnectState) -> Result<Option<ConnectStatePatch>, E>,
        E: From<StorageError>,
    {
        let _guard = self.write_lock.lock();
        let mut state = self.read_connect_state()?;
        let Some(patch) = decide(&state)? else {
            return Ok(None);
        };
        state.apply(&patch);
        self.write_connect_state(&state)?;
        Ok(Some(state))
    }

    fn write_connect_state(&self, state: &ConnectState) -> StorageResult<()> {
        let json = serde_json::to_string(state)?;
        self.storage.set(StorageKeys::CONNECT_STATE, &json)?;
        debug!(
            status = %state.status,
            session_id = state.session_id.as_deref().unwrap_or(""),
            attempt = state.poll_attempt,
            "Persisted connect state"
        );
        Ok(())
    }

    // ==========================================
    // Credential
    // ==========================================

    /// Read the stored credential, if any.
    pub fn read_credential(&self) -> StorageResult<Option<CredentialRecord>> {
        match self.storage.get(StorageKeys::CREDENTIAL_RECORD)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store a newly issued credential, keeping the UI's repository
    /// selection from any existing record.
    pub fn write_credential(
        &self,
        device_token: &str,
        device_token_expiry: Option<i64>,
    ) -> StorageResult<CredentialRecord> {
        let previous = self.read_credential().unwrap_or_else(|e| {
            warn!(error = %e, "Existing credential record unreadable, replacing it");
            None
        });

        let record = CredentialRecord::issued(device_token, device_token_expiry, previous.as_ref());
        self.storage
            .set(StorageKeys::CREDENTIAL_RECORD, &serde_json::to_string(&record)?)?;
        debug!(expiry = ?device_token_expiry, "Stored credential record");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectStatus, MemoryStore};

    fn store() -> (Arc<MemoryStore>, StateStore) {
        let backend = Arc::new(MemoryStore::new());
        (backend.clone(), StateStore::new(backend))
    }

    #[test]
    fn test_missing_state_reads_as_idle() {
        let (_, store) = store();
        let state = store.read_connect_state().unwrap();
        assert_eq!(state.status, ConnectStatus::Idle);
        assert_eq!(state.poll_attempt, 0);
        assert!(state.session_id.is_none());
    }

    #[test]
    fn test_corrupt_state_reads_as_idle() {
        let (backend, store) = store();
        backend.set(StorageKeys::CONNECT_STATE, "{not json").unwrap();
        assert_eq!(store.read_connect_state().unwrap(), ConnectState::default());
    }

    #[test]
    fn test_update_merges_onto_stored_value() {
        let (backend, store) = store();
        store
            .update_connect_state(&ConnectStatePatch::new_session("s1", 10))
            .unwrap();
        store
            .update_connect_state(&ConnectStatePatch::status(ConnectStatus::WaitingForInstall))
            .unwrap();

        let raw = backend.get(StorageKeys::CONNECT_STATE).unwrap().unwrap();
        let persisted: ConnectState = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.status, ConnectStatus::WaitingForInstall);
        assert_eq!(persisted.session_id.as_deref(), Some("s1"));
        assert_eq!(persisted.timestamps.started_at, Some(10));
    }

    #[test]
    fn test_conditional_update_skips_other_sessions() {
        let (_, store) = store();
        store
            .update_connect_state(&ConnectStatePatch::new_session("s2", 10))
            .unwrap();

        let written = store
            .update_connect_state_with(|state| {
                Ok::<_, StorageError>(state.is_session("s1").then(|| {
                    ConnectStatePatch::status(ConnectStatus::Error).with_error("boom")
                }))
            })
            .unwrap();

        assert!(written.is_none());
        let state = store.read_connect_state().unwrap();
        assert_eq!(state.status, ConnectStatus::Starting);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_conditional_update_propagates_decision_error() {
        let (_, store) = store();
        let result = store.update_connect_state_with(|_| {
            Err::<Option<ConnectStatePatch>, _>(StorageError::InvalidKey("x".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.read_connect_state().unwrap(), ConnectState::default());
    }

    #[test]
    fn test_write_credential_preserves_selection() {
        let (backend, store) = store();
        backend
            .set(
                StorageKeys::CREDENTIAL_RECORD,
                r#"{"deviceToken":"old","selectedRepo":"acme/docs","branch":"drafts"}"#,
            )
            .unwrap();

        let record = store.write_credential("new", Some(42)).unwrap();
        assert_eq!(record.device_token, "new");
        assert_eq!(record.device_token_expiry, Some(42));
        assert_eq!(record.selected_repo.as_deref(), Some("acme/docs"));
        assert_eq!(record.branch, "drafts");
        assert_eq!(store.read_credential().unwrap(), Some(record));
    }

    #[test]
    fn test_write_credential_first_time_defaults() {
        let (_, store) = store();
        assert!(store.read_credential().unwrap().is_none());

        let record = store.write_credential("tok", None).unwrap();
        assert_eq!(record.branch, "main");
        assert!(record.selected_repo.is_none());
        assert_eq!(store.read_credential().unwrap(), Some(record));
    }
}
