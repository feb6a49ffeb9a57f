//! Dispatches inbound messages to the connect flow and the relay.

use crate::protocol::{decode, Command, Response};
use github_connect::ConnectFlowController;
use request_relay::AuthenticatedRequestRelay;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// Turns one inbound line into one response.
#[derive(Clone)]
pub struct MessageRouter {
    controller: ConnectFlowController,
    relay: AuthenticatedRequestRelay,
}

impl MessageRouter {
    pub fn new(controller: ConnectFlowController, relay: AuthenticatedRequestRelay) -> Self {
        Self { controller, relay }
    }

    pub async fn handle_line(&self, line: &str) -> Response {
        match decode(line) {
            Ok((id, command)) => self.dispatch(id, command).await,
            Err(response) => {
                warn!(error = response.error.as_deref().unwrap_or(""), "Rejected inbound message");
                response
            }
        }
    }

    async fn dispatch(&self, id: Option<Value>, command: Command) -> Response {
        match command {
            Command::GithubConnectStart => self.handle_connect_start(id),
            Command::FetchData(request) => {
                debug!(method = %request.method, url = %request.url, "Handling FETCH_DATA");
                match self.relay.perform(&request).await {
                    Ok(body) => Response::ok(id, Value::String(body)),
                    Err(e) => Response::err(id, e.to_string()),
                }
            }
            Command::GithubConnectGetState => match self.controller.connection_summary() {
                Ok(summary) => match serde_json::to_value(summary) {
                    Ok(data) => Response::ok(id, data),
                    Err(e) => Response::err(id, e.to_string()),
                },
                Err(e) => Response::err(id, e.to_string()),
            },
            Command::GithubConnectCallback { state } => {
                match self.controller.record_callback(&state) {
                    Ok(recorded) => Response::ok(id, json!({ "recorded": recorded })),
                    Err(e) => Response::err(id, e.to_string()),
                }
            }
        }
    }

    /// Acknowledge immediately; the flow reports progress through
    /// `GITHUB_CONNECT_STATUS` notifications.
    fn handle_connect_start(&self, id: Option<Value>) -> Response {
        info!("Handling GITHUB_CONNECT_START");
        let controller = self.controller.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.start().await {
                error!(error = %e, "GitHub connect could not start");
            }
        });
        Response::ok(id, json!({ "started": true }))
    }
}
