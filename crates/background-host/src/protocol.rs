//! Message protocol between the UI and the host.
//!
//! One JSON object per line in both directions. Messages are flat: the
//! `type` field names the message and its fields sit next to it.
//!
//! Inbound (stdin):
//!   { "id": <any>, "type": "GITHUB_CONNECT_START" }
//!   { "id": <any>, "type": "FETCH_DATA", "url": "...", "method": "POST", "body": ..., "headers": {...},
//!     "cookies": ["name=value", ...] }
//!   { "id": <any>, "type": "GITHUB_CONNECT_GET_STATE" }
//!   { "id": <any>, "type": "GITHUB_CONNECT_CALLBACK", "state": "<sessionId>" }
//!
//! Responses (stdout), `id` echoed when present:
//!   { "id": <any>, "ok": true, "data": ... }
//!   { "id": <any>, "ok": false, "error": "..." }
//!
//! Notifications (stdout):
//!   { "type": "GITHUB_CONNECT_STATUS", "state": {...} }
//!   { "type": "OPEN_TAB", "url": "..." }

use bridge_storage::ConnectState;
use request_relay::RelayRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message types the host understands.
pub const KNOWN_TYPES: &[&str] = &[
    "GITHUB_CONNECT_START",
    "FETCH_DATA",
    "GITHUB_CONNECT_GET_STATE",
    "GITHUB_CONNECT_CALLBACK",
];

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    GithubConnectStart,
    FetchData(RelayRequest),
    GithubConnectGetState,
    GithubConnectCallback { state: String },
}

/// Reply to one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: Option<Value>, data: Value) -> Self {
        Self {
            id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Unsolicited host-to-UI message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    GithubConnectStatus { state: ConnectState },
    OpenTab { url: String },
}

/// Anything written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Response(Response),
    Notification(Notification),
}

/// Split a raw line into its echo id and command.
pub fn decode(line: &str) -> Result<(Option<Value>, Command), Response> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Response::err(None, format!("Malformed message: {}", e)))?;

    let id = value.get("id").cloned();
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => return Err(Response::err(id, "Message has no type")),
    };

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Err(Response::err(id, format!("Unknown message type: {}", kind)));
    }

    match serde_json::from_value::<Command>(value) {
        Ok(command) => Ok((id, command)),
        Err(e) => Err(Response::err(id, format!("Invalid {} message: {}", kind, e))),
    }
}
