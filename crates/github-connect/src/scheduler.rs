//! The handshake poll loop.

use crate::connect_fsm::{ConnectInput, PollConfig};
use crate::flow_state::{Advance, FlowState};
use crate::handshake::{HandshakeClient, PollOutcome};
use crate::ConnectResult;
use bridge_storage::{now_millis, ConnectStatePatch};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a poll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// A credential was stored and the session is `connected`.
    Connected,
    /// The server rejected the session or could not be reached.
    Failed,
    /// Every attempt came back pending.
    TimedOut,
    /// A newer session replaced this one.
    Superseded,
    /// The session was already `connected` or `error`.
    AlreadySettled,
}

/// Drives [`HandshakeClient`] for one session until it settles.
pub struct PollScheduler {
    flow: Arc<FlowState>,
    client: Arc<dyn HandshakeClient>,
    config: PollConfig,
}

impl PollScheduler {
    pub fn new(flow: Arc<FlowState>, client: Arc<dyn HandshakeClient>, config: PollConfig) -> Self {
        Self {
            flow,
            client,
            config,
        }
    }

    /// Poll `session_id` from `start_attempt` up to the configured bound.
    ///
    /// The loop re-reads the stored state before every attempt and again
    /// before persisting each outcome; once another session owns the record
    /// it stops without writing anything.
    ///
    /// If the store fails mid-loop, the session is moved to `error` on a
    /// best-effort basis before the error is returned.
    pub async fn run(&self, session_id: &str, start_attempt: u32) -> ConnectResult<PollExit> {
        let result = self.poll_until_settled(session_id, start_attempt).await;

        if let Err(e) = &result {
            error!(session_id, error = %e, "Poll loop aborted");
            let patch = ConnectStatePatch::default().with_error(e.to_string());
            if let Err(write_err) = self.flow.advance(session_id, ConnectInput::Fail, patch) {
                error!(
                    session_id,
                    error = %write_err,
                    "Could not record poll failure, no further progress until the host restarts"
                );
            }
        }

        result
    }

    async fn poll_until_settled(
        &self,
        session_id: &str,
        start_attempt: u32,
    ) -> ConnectResult<PollExit> {
        info!(session_id, start_attempt, "Handshake polling started");

        for attempt in start_attempt..=self.config.max_attempt {
            if attempt > start_attempt {
                tokio::time::sleep(self.config.interval).await;
            }

            let state = self.flow.read()?;
            if !state.is_session(session_id) {
                debug!(session_id, attempt, "Session superseded, polling stopped");
                return Ok(PollExit::Superseded);
            }
            if !state.status.is_awaiting_install() {
                debug!(session_id, status = %state.status, "Session no longer awaiting install");
                return Ok(PollExit::AlreadySettled);
            }

            let outcome = match self.client.poll(session_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        session_id,
                        attempt,
                        transient = e.is_transient(),
                        error = %e,
                        "Handshake poll request failed"
                    );
                    PollOutcome::Failed(e.to_string())
                }
            };

            match outcome {
                PollOutcome::Pending => {
                    debug!(session_id, attempt, "Handshake pending");
                    let patch = ConnectStatePatch::default().with_poll_attempt(attempt);
                    match self.flow.advance(session_id, ConnectInput::PollPending, patch)? {
                        Advance::Applied(_) => continue,
                        skipped => return Ok(Self::exit_for(skipped)),
                    }
                }
                PollOutcome::Authorized {
                    device_token,
                    expires_at,
                } => return self.complete(session_id, attempt, &device_token, expires_at),
                PollOutcome::Failed(message) => {
                    warn!(session_id, attempt, error = %message, "Handshake failed");
                    let patch = ConnectStatePatch::default()
                        .with_poll_attempt(attempt)
                        .with_error(message);
                    return Ok(
                        match self.flow.advance(session_id, ConnectInput::Fail, patch)? {
                            Advance::Applied(_) => PollExit::Failed,
                            skipped => Self::exit_for(skipped),
                        },
                    );
                }
            }
        }

        let message = self.config.timeout_message();
        warn!(session_id, "{}", message);
        let patch = ConnectStatePatch::default().with_error(message);
        Ok(
            match self.flow.advance(session_id, ConnectInput::TimedOut, patch)? {
                Advance::Applied(_) => PollExit::TimedOut,
                skipped => Self::exit_for(skipped),
            },
        )
    }

    fn complete(
        &self,
        session_id: &str,
        attempt: u32,
        device_token: &str,
        expires_at: Option<i64>,
    ) -> ConnectResult<PollExit> {
        let patch = ConnectStatePatch::default()
            .with_poll_attempt(attempt)
            .with_connected_at(now_millis());
        match self
            .flow
            .authorize(session_id, device_token, expires_at, patch)?
        {
            Advance::Applied(_) => {
                info!(session_id, attempt, "GitHub connection established");
                Ok(PollExit::Connected)
            }
            skipped => {
                debug!(session_id, "Session replaced during handshake, credential discarded");
                Ok(Self::exit_for(skipped))
            }
        }
    }

    fn exit_for(skipped: Advance) -> PollExit {
        match skipped {
            Advance::Settled => PollExit::AlreadySettled,
            _ => PollExit::Superseded,
        }
    }
}
