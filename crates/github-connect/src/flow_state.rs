//! Persisted connect state plus change notifications.

use crate::connect_fsm::{next_status, ConnectInput};
use crate::{ConnectError, ConnectResult};
use bridge_storage::{ConnectState, ConnectStatePatch, CredentialRecord, StateStore};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 64;

/// Result of a session-scoped transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The transition was persisted and broadcast.
    Applied(ConnectState),
    /// The stored state belongs to another session.
    Superseded,
    /// The session already reached `connected` or `error`.
    Settled,
}

/// Every write to `connectState` goes through here so that it is validated
/// by the FSM and broadcast to listeners after it is persisted.
pub struct FlowState {
    store: Arc<StateStore>,
    events: broadcast::Sender<ConnectState>,
}

impl FlowState {
    pub fn new(store: Arc<StateStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, events }
    }

    /// Receive every persisted state change.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectState> {
        self.events.subscribe()
    }

    pub fn read(&self) -> ConnectResult<ConnectState> {
        Ok(self.store.read_connect_state()?)
    }

    pub fn read_credential(&self) -> ConnectResult<Option<CredentialRecord>> {
        Ok(self.store.read_credential()?)
    }

    /// Begin a new session, replacing whatever was stored.
    pub fn begin(&self, session_id: &str, started_at: i64) -> ConnectResult<ConnectState> {
        let state = self
            .store
            .update_connect_state_with(|current| {
                next_status(current.status, ConnectInput::Start)?;
                Ok::<_, ConnectError>(Some(ConnectStatePatch::new_session(session_id, started_at)))
            })?
            .ok_or_else(|| {
                ConnectError::InvalidStateTransition("new session was not persisted".to_string())
            })?;

        self.publish(&state);
        Ok(state)
    }

    /// Apply `input` to `session_id`, merging `patch` into the stored state.
    ///
    /// The identity check, FSM validation and write happen under the store's
    /// write lock, so a concurrent `begin` cannot slip in between them.
    pub fn advance(
        &self,
        session_id: &str,
        input: ConnectInput,
        patch: ConnectStatePatch,
    ) -> ConnectResult<Advance> {
        self.transition(session_id, input, patch, || Ok(()))
    }

    /// Store the issued credential and move `session_id` to `connected`.
    ///
    /// The credential is written under the same lock as the state, and only
    /// once the session is known to still own the record.
    pub fn authorize(
        &self,
        session_id: &str,
        device_token: &str,
        expires_at: Option<i64>,
        patch: ConnectStatePatch,
    ) -> ConnectResult<Advance> {
        self.transition(session_id, ConnectInput::Authorized, patch, || {
            self.store.write_credential(device_token, expires_at)?;
            Ok(())
        })
    }

    fn transition<F>(
        &self,
        session_id: &str,
        input: ConnectInput,
        patch: ConnectStatePatch,
        on_accept: F,
    ) -> ConnectResult<Advance>
    where
        F: FnOnce() -> ConnectResult<()>,
    {
        let mut skipped = Advance::Superseded;

        let written = self.store.update_connect_state_with(|current| {
            if !current.is_session(session_id) {
                return Ok(None);
            }
            if current.status.is_terminal() {
                skipped = Advance::Settled;
                return Ok(None);
            }

            let from = current.status;
            let to = next_status(from, input).inspect_err(|e| {
                warn!(session_id, error = %e, "Rejected connect state transition");
            })?;

            on_accept()?;

            if from != to {
                debug!(session_id, old_state = %from, new_state = %to, "Connect state transition");
            }

            Ok::<_, ConnectError>(Some(ConnectStatePatch {
                status: Some(to),
                ..patch
            }))
        })?;

        match written {
            Some(state) => {
                self.publish(&state);
                Ok(Advance::Applied(state))
            }
            None => Ok(skipped),
        }
    }

    fn publish(&self, state: &ConnectState) {
        if self.events.send(state.clone()).is_err() {
            debug!(status = %state.status, "No listeners for connect state change");
        }
    }
}
