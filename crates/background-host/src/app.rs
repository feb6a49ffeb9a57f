//! Host wiring and the stdio message loop.

use crate::protocol::{Notification, Outbound};
use crate::router::MessageRouter;
use crate::tabs::HostTabOpener;
use anyhow::Context;
use bridge_config_and_utils::{Config, Paths};
use bridge_storage::ConnectState;
use github_connect::{ConnectFlowController, HostEvent, ResumeGuard};
use request_relay::{AuthenticatedRequestRelay, ReqwestTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for in-flight responses to be written.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Read inbound lines until EOF, answering each on `outbound`.
///
/// Every message is handled on its own task so a slow relay call does not
/// hold up the ones behind it.
pub async fn serve<R>(
    reader: R,
    router: MessageRouter,
    outbound: mpsc::UnboundedSender<Outbound>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Input closed");
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to read input");
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let router = router.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            let response = router.handle_line(&line).await;
            if outbound.send(Outbound::Response(response)).is_err() {
                debug!("Output closed before response was written");
            }
        });
    }
}

/// Serialize outbound messages as JSON lines until every sender is gone.
pub fn spawn_writer<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            line.push('\n');

            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!(error = %e, "Failed to write output");
                return;
            }
            if let Err(e) = writer.flush().await {
                error!(error = %e, "Failed to flush output");
                return;
            }
        }
    })
}

/// Forward every connect state change as `GITHUB_CONNECT_STATUS`.
pub fn spawn_status_forwarder(
    mut states: broadcast::Receiver<ConnectState>,
    outbound: mpsc::UnboundedSender<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match states.recv().await {
                Ok(state) => {
                    let notification = Notification::GithubConnectStatus { state };
                    if outbound.send(Outbound::Notification(notification)).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped connect status notifications");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

/// Run the host until stdin closes or a shutdown signal arrives.
pub async fn run_host(config: Config, paths: Paths, event: HostEvent) -> anyhow::Result<()> {
    paths
        .ensure_dirs()
        .context("Failed to create host directories")?;
    let store = Arc::new(
        bridge_storage::create_state_store(&paths).context("Failed to open durable state")?,
    );

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer = spawn_writer(tokio::io::stdout(), outbound_rx);

    let controller = ConnectFlowController::from_config(
        &config,
        store,
        Arc::new(HostTabOpener::new(outbound_tx.clone())),
    )
    .context("Failed to set up GitHub connect")?;
    let relay = AuthenticatedRequestRelay::new(Arc::new(
        ReqwestTransport::new().context("Failed to build HTTP client")?,
    ));

    let forwarder = spawn_status_forwarder(controller.subscribe(), outbound_tx.clone());

    match ResumeGuard::new(controller.clone()).on_host_event(event) {
        Ok(Some(_)) => info!("Resumed pending GitHub connect session"),
        Ok(None) => {}
        Err(e) => error!(error = %e, "Failed to resume GitHub connect session"),
    }

    info!(
        base_dir = %paths.base_dir().display(),
        handshake_url = %config.handshake_base_url,
        "Background host started"
    );

    let router = MessageRouter::new(controller, relay);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());

    tokio::select! {
        _ = serve(stdin, router, outbound_tx.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, exiting...");
        }
    }

    forwarder.abort();
    drop(outbound_tx);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("Output still busy at shutdown, dropping pending messages");
    }

    info!("Background host stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;
    use crate::router::tests::{controller_with, FixedTransport, RecordingTabs};
    use bridge_storage::{ConnectStatus, MemoryStore};
    use serde_json::{json, Value};

    fn router(status: u16, body: &'static str) -> MessageRouter {
        let controller = controller_with(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingTabs::default()),
        );
        let relay = AuthenticatedRequestRelay::new(Arc::new(FixedTransport::new(status, body)));
        MessageRouter::new(controller, relay)
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Some(message) = rx.recv().await {
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn test_serve_answers_every_line() {
        let input: &[u8] = b"{\"id\":1,\"type\":\"FETCH_DATA\",\"url\":\"https://a.example/x\"}\n\n{\"id\":2,\"type\":\"NOPE\"}\n";
        let (tx, rx) = mpsc::unbounded_channel();

        serve(input, router(200, "hello"), tx).await;
        let mut responses: Vec<Response> = drain(rx)
            .await
            .into_iter()
            .filter_map(|message| match message {
                Outbound::Response(response) => Some(response),
                Outbound::Notification(_) => None,
            })
            .collect();
        responses.sort_by_key(|r| r.id.as_ref().and_then(Value::as_i64));

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], Response::ok(Some(json!(1)), json!("hello")));
        assert!(!responses[1].ok);
    }

    #[tokio::test]
    async fn test_writer_emits_one_json_object_per_line() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (client, mut server) = tokio::io::duplex(4096);

        let writer = spawn_writer(client, rx);
        tx.send(Outbound::Response(Response::ok(Some(json!("a")), json!(1))))
            .unwrap();
        tx.send(Outbound::Notification(Notification::OpenTab {
            url: "https://github.com/apps/docbridge/installations/new?state=S".to_string(),
        }))
        .unwrap();
        drop(tx);
        writer.await.unwrap();

        let mut raw = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut server, &mut raw)
            .await
            .unwrap();
        let lines: Vec<Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], "a");
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[1]["type"], "OPEN_TAB");
    }

    #[tokio::test]
    async fn test_status_forwarder_wraps_states() {
        let (states_tx, states_rx) = broadcast::channel(4);
        let (tx, rx) = mpsc::unbounded_channel();

        let forwarder = spawn_status_forwarder(states_rx, tx);
        let mut state = ConnectState::default();
        state.status = ConnectStatus::Polling;
        states_tx.send(state).unwrap();
        drop(states_tx);
        forwarder.await.unwrap();

        let messages = drain(rx).await;
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            Outbound::Notification(Notification::GithubConnectStatus { state }) => {
                assert_eq!(state.status, ConnectStatus::Polling);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
