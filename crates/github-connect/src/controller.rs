//! Entry point for the GitHub connect flow.

use crate::connect_fsm::{ConnectInput, PollConfig};
use crate::flow_state::{Advance, FlowState};
use crate::handshake::{HandshakeClient, HttpHandshakePoller};
use crate::install::{install_url, TabOpener};
use crate::scheduler::{PollExit, PollScheduler};
use crate::session_id::generate_session_id;
use crate::{ConnectError, ConnectResult};
use bridge_config_and_utils::Config;
use bridge_storage::{now_millis, ConnectState, ConnectStatePatch, StateStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// A started connect session.
#[derive(Debug)]
pub struct StartHandle {
    pub session_id: String,
    pub install_url: Url,
    /// The poll loop running in the background.
    pub task: JoinHandle<ConnectResult<PollExit>>,
}

/// What the UI may know about the connection. Never carries the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub state: ConnectState,
    pub has_credential: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token_expiry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Where the install page lives.
#[derive(Debug, Clone)]
pub struct ProviderApp {
    pub provider_base: Url,
    pub app_slug: String,
}

impl ProviderApp {
    pub fn from_config(config: &Config) -> ConnectResult<Self> {
        Ok(Self {
            provider_base: config.provider_url().map_err(|e| ConnectError::Config(e.to_string()))?,
            app_slug: config.app_slug.clone(),
        })
    }
}

/// Owns the connect state machine.
///
/// Cheap to clone; all clones share the same store and broadcast channel.
#[derive(Clone)]
pub struct ConnectFlowController {
    flow: Arc<FlowState>,
    scheduler: Arc<PollScheduler>,
    tab_opener: Arc<dyn TabOpener>,
    app: ProviderApp,
}

impl ConnectFlowController {
    pub fn new(
        store: Arc<StateStore>,
        client: Arc<dyn HandshakeClient>,
        tab_opener: Arc<dyn TabOpener>,
        app: ProviderApp,
        poll: PollConfig,
    ) -> Self {
        let flow = Arc::new(FlowState::new(store));
        let scheduler = Arc::new(PollScheduler::new(flow.clone(), client, poll));
        Self {
            flow,
            scheduler,
            tab_opener,
            app,
        }
    }

    /// Build a controller that polls the configured handshake server over HTTP.
    pub fn from_config(
        config: &Config,
        store: Arc<StateStore>,
        tab_opener: Arc<dyn TabOpener>,
    ) -> ConnectResult<Self> {
        let handshake_url = config
            .handshake_url()
            .map_err(|e| ConnectError::Config(e.to_string()))?;
        let client = Arc::new(HttpHandshakePoller::new(&handshake_url)?);

        Ok(Self::new(
            store,
            client,
            tab_opener,
            ProviderApp::from_config(config)?,
            PollConfig::from_config(config),
        ))
    }

    /// Receive every persisted state change.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectState> {
        self.flow.subscribe()
    }

    /// Start a new session, superseding any previous one.
    ///
    /// Returns once the install page is open and polling has been handed
    /// to a background task. If the page cannot be opened the session is
    /// moved to `error` and the error is returned.
    pub async fn start(&self) -> ConnectResult<StartHandle> {
        let session_id = generate_session_id()?;
        self.flow.begin(&session_id, now_millis())?;
        info!(session_id = %session_id, "Connect session started");

        let url = match install_url(&self.app.provider_base, &self.app.app_slug, &session_id) {
            Ok(url) => url,
            Err(e) => return Err(self.fail_start(&session_id, e)),
        };

        if let Err(e) = self.tab_opener.open_tab(&url).await {
            return Err(self.fail_start(&session_id, e));
        }

        match self.flow.advance(
            &session_id,
            ConnectInput::InstallPageOpened,
            ConnectStatePatch::default(),
        )? {
            Advance::Applied(_) => {}
            _ => {
                debug!(session_id = %session_id, "Session superseded before polling began");
            }
        }

        let task = self.spawn_poll(session_id.clone(), 0);
        Ok(StartHandle {
            session_id,
            install_url: url,
            task,
        })
    }

    fn fail_start(&self, session_id: &str, cause: ConnectError) -> ConnectError {
        error!(session_id, error = %cause, "Connect session failed to start");
        let patch = ConnectStatePatch::default().with_error(cause.to_string());
        if let Err(e) = self.flow.advance(session_id, ConnectInput::Fail, patch) {
            warn!(session_id, error = %e, "Could not persist start failure");
        }
        cause
    }

    /// Re-arm polling for a session left mid-flight by a previous host.
    ///
    /// Only the persisted `sessionId` and `pollAttempt` are trusted.
    pub fn resume(&self) -> ConnectResult<Option<JoinHandle<ConnectResult<PollExit>>>> {
        let state = self.flow.read()?;

        let session_id = match (&state.session_id, state.status.is_awaiting_install()) {
            (Some(id), true) => id.clone(),
            _ => {
                debug!(status = %state.status, "Nothing to resume");
                return Ok(None);
            }
        };

        let start_attempt = state.poll_attempt.saturating_add(1);
        info!(session_id = %session_id, start_attempt, "Resuming handshake polling");
        Ok(Some(self.spawn_poll(session_id, start_attempt)))
    }

    fn spawn_poll(
        &self,
        session_id: String,
        start_attempt: u32,
    ) -> JoinHandle<ConnectResult<PollExit>> {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            let result = scheduler.run(&session_id, start_attempt).await;
            match &result {
                Ok(exit) => debug!(session_id = %session_id, exit = ?exit, "Poll loop finished"),
                Err(e) => debug!(session_id = %session_id, error = %e, "Poll loop ended with error"),
            }
            result
        })
    }

    /// Record that the provider redirected back with `state=<session_id>`.
    ///
    /// Returns whether the live session accepted the mark.
    pub fn record_callback(&self, session_id: &str) -> ConnectResult<bool> {
        let state = self.flow.read()?;
        if !state.is_session(session_id) || !state.status.is_awaiting_install() {
            debug!(session_id, status = %state.status, "Ignoring install callback");
            return Ok(false);
        }

        let patch = ConnectStatePatch::default().with_callback_seen_at(now_millis());
        match self.flow.advance(session_id, ConnectInput::CallbackSeen, patch) {
            Ok(Advance::Applied(_)) => Ok(true),
            Ok(_) | Err(ConnectError::InvalidStateTransition(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The persisted connect state.
    pub fn current_state(&self) -> ConnectResult<ConnectState> {
        self.flow.read()
    }

    /// Connect state plus credential metadata, without the token.
    pub fn connection_summary(&self) -> ConnectResult<ConnectionSummary> {
        let state = self.flow.read()?;
        let credential = self.flow.read_credential()?;

        Ok(ConnectionSummary {
            state,
            has_credential: credential.is_some(),
            device_token_expiry: credential.as_ref().and_then(|c| c.device_token_expiry),
            selected_repo: credential.as_ref().and_then(|c| c.selected_repo.clone()),
            branch: credential.map(|c| c.branch),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::PollOutcome;
    use crate::scheduler::tests::ScriptedHandshake;
    use async_trait::async_trait;
    use bridge_storage::{ConnectStatus, DurableStore, MemoryStore, StorageKeys};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTabs {
        opened: Mutex<Vec<Url>>,
        fail: bool,
    }

    #[async_trait]
    impl TabOpener for RecordingTabs {
        async fn open_tab(&self, url: &Url) -> ConnectResult<()> {
            if self.fail {
                return Err(ConnectError::TabOpen("browser unavailable".to_string()));
            }
            self.opened.lock().push(url.clone());
            Ok(())
        }
    }

    struct Harness {
        backend: Arc<MemoryStore>,
        client: Arc<ScriptedHandshake>,
        tabs: Arc<RecordingTabs>,
        controller: ConnectFlowController,
    }

    fn harness_with(script: Vec<ConnectResult<PollOutcome>>, tabs: RecordingTabs) -> Harness {
        let backend = Arc::new(MemoryStore::new());
        let store = Arc::new(StateStore::new(backend.clone()));
        let client = Arc::new(ScriptedHandshake::new(script));
        let tabs = Arc::new(tabs);
        let controller = ConnectFlowController::new(
            store,
            client.clone(),
            tabs.clone(),
            ProviderApp {
                provider_base: Url::parse("https://github.com").unwrap(),
                app_slug: "docbridge".to_string(),
            },
            PollConfig::default(),
        );
        Harness {
            backend,
            client,
            tabs,
            controller,
        }
    }

    fn harness(script: Vec<ConnectResult<PollOutcome>>) -> Harness {
        harness_with(script, RecordingTabs::default())
    }

    fn authorized() -> ConnectResult<PollOutcome> {
        Ok(PollOutcome::Authorized {
            device_token: "ghu_issued".to_string(),
            expires_at: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_opens_install_page_and_connects() {
        let h = harness(vec![Ok(PollOutcome::Pending), authorized()]);
        let mut events = h.controller.subscribe();

        let handle = h.controller.start().await.unwrap();
        assert_eq!(handle.session_id.len(), 64);
        assert_eq!(
            h.tabs.opened.lock().as_slice(),
            &[handle.install_url.clone()]
        );
        assert!(handle
            .install_url
            .as_str()
            .ends_with(&format!("state={}", handle.session_id)));

        assert_eq!(handle.task.await.unwrap().unwrap(), PollExit::Connected);

        let mut seen = Vec::new();
        while let Ok(state) = events.try_recv() {
            seen.push(state.status);
        }
        assert_eq!(
            seen,
            vec![
                ConnectStatus::Starting,
                ConnectStatus::WaitingForInstall,
                ConnectStatus::Polling,
                ConnectStatus::Connected,
            ]
        );

        let summary = h.controller.connection_summary().unwrap();
        assert!(summary.has_credential);
        assert_eq!(summary.branch.as_deref(), Some("main"));
        assert_eq!(summary.state.status, ConnectStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_persists_fresh_session() {
        let h = harness(vec![]);
        h.backend
            .set(
                StorageKeys::CONNECT_STATE,
                r#"{"status":"error","sessionId":"old","pollAttempt":60,
                    "lastError":"Polling timed out after 60 attempts",
                    "timestamps":{"startedAt":1,"callbackSeenAt":2}}"#,
            )
            .unwrap();

        let handle = h.controller.start().await.unwrap();
        let state = h.controller.current_state().unwrap();

        assert_eq!(state.session_id.as_deref(), Some(handle.session_id.as_str()));
        assert!(state.last_error.is_none());
        assert_eq!(state.poll_attempt, 0);
        assert!(state.timestamps.started_at.unwrap() > 2);
        assert!(state.timestamps.callback_seen_at.is_none());
        handle.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_failure_moves_to_error() {
        let h = harness_with(
            vec![],
            RecordingTabs {
                fail: true,
                ..Default::default()
            },
        );

        let result = h.controller.start().await;

        assert!(matches!(result, Err(ConnectError::TabOpen(_))));
        let state = h.controller.current_state().unwrap();
        assert_eq!(state.status, ConnectStatus::Error);
        assert!(state.last_error.unwrap().contains("browser unavailable"));
        assert_eq!(h.client.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_start_supersedes_running_loop() {
        let h = harness(vec![]);

        let first = h.controller.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(3_000)).await;
        let second = h.controller.start().await.unwrap();

        assert_eq!(first.task.await.unwrap().unwrap(), PollExit::Superseded);

        let state = h.controller.current_state().unwrap();
        assert_eq!(state.session_id.as_deref(), Some(second.session_id.as_str()));
        assert_ne!(state.status, ConnectStatus::Error);
        assert!(state.last_error.is_none());
        second.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_continues_after_persisted_attempt() {
        let h = harness(vec![authorized()]);
        h.backend
            .set(
                StorageKeys::CONNECT_STATE,
                r#"{"status":"polling","sessionId":"S","pollAttempt":10}"#,
            )
            .unwrap();

        let task = h.controller.resume().unwrap().expect("poll loop resumed");
        assert_eq!(task.await.unwrap().unwrap(), PollExit::Connected);

        assert_eq!(h.client.calls.lock().as_slice(), &["S".to_string()]);
        assert_eq!(h.controller.current_state().unwrap().poll_attempt, 11);
    }

    #[tokio::test]
    async fn test_resume_is_noop_when_idle_or_settled() {
        let h = harness(vec![]);
        assert!(h.controller.resume().unwrap().is_none());

        h.backend
            .set(
                StorageKeys::CONNECT_STATE,
                r#"{"status":"connected","sessionId":"S","pollAttempt":3}"#,
            )
            .unwrap();
        assert!(h.controller.resume().unwrap().is_none());
        assert_eq!(h.client.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_callback_marks_live_session_only() {
        let h = harness(vec![]);
        let handle = h.controller.start().await.unwrap();

        assert!(!h.controller.record_callback("someone-else").unwrap());
        assert!(h.controller.record_callback(&handle.session_id).unwrap());

        let first_mark = h
            .controller
            .current_state()
            .unwrap()
            .timestamps
            .callback_seen_at;
        assert!(first_mark.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        h.controller.record_callback(&handle.session_id).unwrap();
        assert_eq!(
            h.controller
                .current_state()
                .unwrap()
                .timestamps
                .callback_seen_at,
            first_mark
        );
        handle.task.abort();
    }

    #[tokio::test]
    async fn test_summary_never_contains_token() {
        let h = harness(vec![]);
        h.backend
            .set(
                StorageKeys::CREDENTIAL_RECORD,
                r#"{"deviceToken":"ghu_secret","deviceTokenExpiry":5,"selectedRepo":"acme/docs","branch":"main"}"#,
            )
            .unwrap();

        let summary = h.controller.connection_summary().unwrap();
        let json = serde_json::to_string(&summary).unwrap();

        assert!(!json.contains("ghu_secret"));
        assert_eq!(summary.device_token_expiry, Some(5));
        assert_eq!(summary.selected_repo.as_deref(), Some("acme/docs"));
    }
}
