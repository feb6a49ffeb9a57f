//! HTTP transport seam and its reqwest implementation.

use crate::RelayResult;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::sync::Arc;
use url::Url;

/// A fully prepared outgoing request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// The parts of a response the relay looks at.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl TransportResponse {
    /// A response with no headers and the canonical reason for `status`.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self {
            status,
            status_text,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request. Transport failures are errors; any HTTP status is a
/// response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> RelayResult<TransportResponse>;

    /// Make `cookies` ambient for later requests under `url`. Transports
    /// without a cookie jar ignore them.
    fn add_cookies(&self, _url: &Url, _cookies: &[String]) {}
}

/// reqwest client with a shared cookie jar, so session cookies set by the
/// target server ride along on later requests.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    jar: Arc<reqwest::cookie::Jar>,
}

impl ReqwestTransport {
    pub fn new() -> RelayResult<Self> {
        let jar = Arc::new(reqwest::cookie::Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()?;
        Ok(Self { client, jar })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> RelayResult<TransportResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }

    fn add_cookies(&self, url: &Url, cookies: &[String]) {
        for cookie in cookies {
            self.jar.add_cookie_str(cookie, url);
        }
    }
}
