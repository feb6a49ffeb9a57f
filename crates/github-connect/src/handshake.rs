//! One round-trip to the handshake server.

use crate::{ConnectError, ConnectResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Longest excerpt of an error body kept in a failure message.
const ERROR_BODY_LIMIT: usize = 200;

/// Classified result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user installed the app and a credential was issued.
    Authorized {
        device_token: String,
        expires_at: Option<i64>,
    },
    /// Nothing yet; ask again later.
    Pending,
    /// The server gave an answer the flow cannot continue from.
    Failed(String),
}

/// Asks the handshake server whether a session has been authorized.
#[async_trait]
pub trait HandshakeClient: Send + Sync {
    /// Poll once. Transport failures are returned as errors, every HTTP
    /// answer is classified into a [`PollOutcome`].
    async fn poll(&self, session_id: &str) -> ConnectResult<PollOutcome>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandshakeSuccess {
    #[serde(default)]
    device_token: Option<String>,
    #[serde(default, rename = "expiresAt", alias = "deviceTokenExpiry")]
    expires_at: Option<serde_json::Value>,
}

/// Expiry as epoch milliseconds. Accepts a number or an RFC 3339 string.
fn parse_expiry(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

fn truncate(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

/// Map an HTTP status and body onto a poll outcome.
///
/// - 2xx with a `deviceToken`: authorized
/// - 404: pending
/// - anything else, including a 2xx without a usable token: failed
pub fn classify_response(status: u16, body: &str) -> PollOutcome {
    if status == 404 {
        return PollOutcome::Pending;
    }

    if !(200..300).contains(&status) {
        return PollOutcome::Failed(format!(
            "Handshake poll failed with status {}: {}",
            status,
            truncate(body, ERROR_BODY_LIMIT)
        ));
    }

    let parsed: HandshakeSuccess = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => return PollOutcome::Failed(format!("Malformed handshake response: {}", e)),
    };

    match parsed.device_token.filter(|token| !token.is_empty()) {
        Some(device_token) => PollOutcome::Authorized {
            device_token,
            expires_at: parsed.expires_at.as_ref().and_then(parse_expiry),
        },
        None => PollOutcome::Failed("Handshake response did not include a device token".to_string()),
    }
}

/// `POST {base}/api/handshake/poll` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpHandshakePoller {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpHandshakePoller {
    pub fn new(base_url: &Url) -> ConnectResult<Self> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &Url) -> ConnectResult<Self> {
        let mut endpoint = base_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| {
                ConnectError::Config(format!("Handshake URL cannot be a base: {}", base_url))
            })?
            .pop_if_empty()
            .extend(["api", "handshake", "poll"]);

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl HandshakeClient for HttpHandshakePoller {
    async fn poll(&self, session_id: &str) -> ConnectResult<PollOutcome> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "sessionId": session_id }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, "Handshake poll answered");

        Ok(classify_response(status, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_pending() {
        assert_eq!(classify_response(404, "not yet"), PollOutcome::Pending);
    }

    #[test]
    fn test_success_with_numeric_expiry() {
        assert_eq!(
            classify_response(200, r#"{"deviceToken":"ghu_abc","expiresAt":1700000000000}"#),
            PollOutcome::Authorized {
                device_token: "ghu_abc".to_string(),
                expires_at: Some(1_700_000_000_000),
            }
        );
    }

    #[test]
    fn test_success_with_string_expiry_alias() {
        assert_eq!(
            classify_response(
                201,
                r#"{"deviceToken":"t","deviceTokenExpiry":"1970-01-01T00:00:01Z"}"#
            ),
            PollOutcome::Authorized {
                device_token: "t".to_string(),
                expires_at: Some(1_000),
            }
        );
    }

    #[test]
    fn test_success_without_expiry() {
        assert_eq!(
            classify_response(200, r#"{"deviceToken":"t"}"#),
            PollOutcome::Authorized {
                device_token: "t".to_string(),
                expires_at: None,
            }
        );
    }

    #[test]
    fn test_success_without_token_fails() {
        assert!(matches!(
            classify_response(200, r#"{"status":"ok"}"#),
            PollOutcome::Failed(_)
        ));
        assert!(matches!(
            classify_response(200, r#"{"deviceToken":""}"#),
            PollOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_malformed_success_body_fails() {
        match classify_response(200, "<html>") {
            PollOutcome::Failed(message) => assert!(message.starts_with("Malformed")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_other_status_fails_with_truncated_body() {
        let body = "x".repeat(500);
        match classify_response(500, &body) {
            PollOutcome::Failed(message) => {
                assert!(message.contains("500"));
                assert!(message.len() < 300);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(classify_response(410, ""), PollOutcome::Failed(_)));
    }

    #[test]
    fn test_endpoint_appends_to_base_path() {
        let base = Url::parse("https://connect.example.com/").unwrap();
        let poller = HttpHandshakePoller::new(&base).unwrap();
        assert_eq!(
            poller.endpoint().as_str(),
            "https://connect.example.com/api/handshake/poll"
        );

        let prefixed = Url::parse("https://example.com/bridge").unwrap();
        let poller = HttpHandshakePoller::new(&prefixed).unwrap();
        assert_eq!(
            poller.endpoint().as_str(),
            "https://example.com/bridge/api/handshake/poll"
        );
    }
}
