//! Persisted record types.
//!
//! Field names are camelCase on disk so the records stay readable by the
//! extension UI, which reads the same JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Status of the connect flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectStatus {
    #[default]
    Idle,
    Starting,
    WaitingForInstall,
    Polling,
    Connected,
    Error,
}

impl ConnectStatus {
    /// `connected` and `error` end a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Connected | Self::Error)
    }

    /// States in which a poll loop should be running.
    pub fn is_awaiting_install(self) -> bool {
        matches!(self, Self::WaitingForInstall | Self::Polling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::WaitingForInstall => "waiting-for-install",
            Self::Polling => "polling",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milestones of one session, in epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTimestamps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_seen_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<i64>,
}

impl ConnectTimestamps {
    /// Add marks from `other`. A mark that is already set is kept.
    pub fn merge(&mut self, other: &ConnectTimestamps) {
        self.started_at = self.started_at.or(other.started_at);
        self.callback_seen_at = self.callback_seen_at.or(other.callback_seen_at);
        self.connected_at = self.connected_at.or(other.connected_at);
    }

    pub fn is_empty(&self) -> bool {
        self.started_at.is_none() && self.callback_seen_at.is_none() && self.connected_at.is_none()
    }
}

/// The live connect-flow record (`connectState`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectState {
    pub status: ConnectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub poll_attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub timestamps: ConnectTimestamps,
}

impl ConnectState {
    /// Whether this record belongs to `session_id`.
    pub fn is_session(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    /// Merge a partial update into this state.
    ///
    /// Within one session `pollAttempt` never decreases. A patch that names
    /// a different session starts from the patch's values.
    pub fn apply(&mut self, patch: &ConnectStatePatch) {
        let new_session = match &patch.session_id {
            Some(id) => !self.is_session(id),
            None => false,
        };

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(id) = &patch.session_id {
            self.session_id = Some(id.clone());
        }
        if let Some(attempt) = patch.poll_attempt {
            self.poll_attempt = if new_session {
                attempt
            } else {
                self.poll_attempt.max(attempt)
            };
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error = last_error.clone();
        }

        if patch.replace_timestamps {
            self.timestamps = patch.timestamps.clone();
        } else {
            self.timestamps.merge(&patch.timestamps);
        }
    }
}

/// A partial update to [`ConnectState`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectStatePatch {
    pub status: Option<ConnectStatus>,
    pub session_id: Option<String>,
    pub poll_attempt: Option<u32>,
    /// `Some(None)` clears the error, `Some(Some(_))` sets it.
    pub last_error: Option<Option<String>>,
    pub timestamps: ConnectTimestamps,
    /// Replace the timestamp set instead of merging into it.
    pub replace_timestamps: bool,
}

impl ConnectStatePatch {
    pub fn status(status: ConnectStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// The full reset written when a new session begins.
    pub fn new_session(session_id: impl Into<String>, started_at: i64) -> Self {
        Self {
            status: Some(ConnectStatus::Starting),
            session_id: Some(session_id.into()),
            poll_attempt: Some(0),
            last_error: Some(None),
            timestamps: ConnectTimestamps {
                started_at: Some(started_at),
                ..Default::default()
            },
            replace_timestamps: true,
        }
    }

    pub fn with_poll_attempt(mut self, attempt: u32) -> Self {
        self.poll_attempt = Some(attempt);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(Some(message.into()));
        self
    }

    pub fn with_callback_seen_at(mut self, at: i64) -> Self {
        self.timestamps.callback_seen_at = Some(at);
        self
    }

    pub fn with_connected_at(mut self, at: i64) -> Self {
        self.timestamps.connected_at = Some(at);
        self
    }
}

fn default_branch() -> String {
    "main".to_string()
}

/// Credential issued by the handshake server (`credentialRecord`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub device_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token_expiry: Option<i64>,
    #[serde(default)]
    pub selected_repo: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl CredentialRecord {
    /// A freshly issued credential, keeping the UI's selections from
    /// `previous` when there is one.
    pub fn issued(
        device_token: impl Into<String>,
        device_token_expiry: Option<i64>,
        previous: Option<&CredentialRecord>,
    ) -> Self {
        let (selected_repo, branch) = match previous {
            Some(prev) => (prev.selected_repo.clone(), prev.branch.clone()),
            None => (None, default_branch()),
        };

        Self {
            device_token: device_token.into(),
            device_token_expiry,
            selected_repo,
            branch,
        }
    }

    /// Whether the token has an expiry at or before `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.device_token_expiry
            .map(|expiry| expiry <= now_ms)
            .unwrap_or(false)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("device_token", &"[redacted]")
            .field("device_token_expiry", &self.device_token_expiry)
            .field("selected_repo", &self.selected_repo)
            .field("branch", &self.branch)
            .finish()
    }
}
