//! Authenticated request relay with anti-forgery token discovery.

use crate::transport::{HttpTransport, TransportRequest, TransportResponse};
use crate::{RelayError, RelayRequest, RelayResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Header carrying the anti-forgery token, both ways.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Value that asks the server to hand out a token.
const CSRF_FETCH: &str = "Fetch";

/// Longest excerpt of an error body kept in [`RelayError::UnexpectedStatus`].
pub const ERROR_BODY_LIMIT: usize = 200;

const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json, text/plain, */*"),
    ("x-requested-with", "XMLHttpRequest"),
    ("content-type", "application/json"),
];

/// Defaults overlaid with the caller's headers. Names are case-insensitive,
/// so a caller's `accept` replaces the default `Accept` instead of adding a
/// second one.
pub fn merge_headers<'a, I>(caller: I) -> RelayResult<HeaderMap>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut headers = HeaderMap::new();
    for &(name, value) in DEFAULT_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    for (name, value) in caller {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RelayError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| RelayError::InvalidHeader(name.to_string()))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

fn parse_method(method: &str) -> RelayResult<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| RelayError::InvalidMethod(method.to_string()))
}

/// `scheme://host[:port]/` of `url`, or `None` for opaque origins.
fn origin_root(url: &Url) -> Option<Url> {
    let origin = url.origin();
    if !origin.is_tuple() {
        return None;
    }
    Url::parse(&format!("{}/", origin.ascii_serialization())).ok()
}

fn truncate(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

/// Proxies requests for the UI.
///
/// Never retries, never touches persisted state and sets no timeout of its
/// own.
#[derive(Clone)]
pub struct AuthenticatedRequestRelay {
    transport: Arc<dyn HttpTransport>,
}

impl AuthenticatedRequestRelay {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Perform `request` and return the response body verbatim.
    pub async fn perform(&self, request: &RelayRequest) -> RelayResult<String> {
        let url = Url::parse(&request.url)?;
        let method = parse_method(&request.method)?;
        let mut headers = merge_headers(&request.headers)?;

        if !request.cookies.is_empty() {
            // Origin-root scope covers the CSRF discovery requests as well.
            let scope = origin_root(&url).unwrap_or_else(|| url.clone());
            self.transport.add_cookies(&scope, &request.cookies);
            debug!(url = %scope, count = request.cookies.len(), "Seeded cookie jar");
        }

        if method == Method::POST && !headers.contains_key(CSRF_HEADER) {
            match self.discover_csrf_token(&url, &headers).await {
                Some(token) => {
                    headers.insert(HeaderName::from_static(CSRF_HEADER), token);
                }
                None => warn!(url = %url, "No CSRF token available, sending without one"),
            }
        }

        debug!(method = %method, url = %url, "Relaying request");
        let response = self
            .transport
            .send(TransportRequest {
                method,
                url,
                headers,
                body: request.body_text(),
            })
            .await?;

        if !response.is_success() {
            warn!(status = response.status, url = %request.url, "Relayed request failed");
            return Err(RelayError::UnexpectedStatus {
                status: response.status,
                status_text: response.status_text,
                body: truncate(&response.body, ERROR_BODY_LIMIT),
            });
        }

        Ok(response.body)
    }

    /// Ask the target, then its origin root, for a token.
    async fn discover_csrf_token(&self, url: &Url, headers: &HeaderMap) -> Option<HeaderValue> {
        if let Some(token) = self.probe(url, headers).await {
            return Some(token);
        }

        let root = origin_root(url)?;
        if &root == url {
            return None;
        }
        self.probe(&root, headers).await
    }

    async fn probe(&self, url: &Url, headers: &HeaderMap) -> Option<HeaderValue> {
        let mut probe_headers = headers.clone();
        probe_headers.remove(CONTENT_TYPE);
        probe_headers.insert(
            HeaderName::from_static(CSRF_HEADER),
            HeaderValue::from_static(CSRF_FETCH),
        );
        if !probe_headers.contains_key(ACCEPT) {
            probe_headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        }

        let response = match self
            .transport
            .send(TransportRequest {
                method: Method::GET,
                url: url.clone(),
                headers: probe_headers,
                body: None,
            })
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "CSRF probe failed");
                return None;
            }
        };

        let token = csrf_token_from(&response);
        debug!(url = %url, found = token.is_some(), "CSRF probe answered");
        token
    }
}

/// Token from a probe response. Servers that refuse to issue one echo
/// `Required`, which is treated as absent.
fn csrf_token_from(response: &TransportResponse) -> Option<HeaderValue> {
    let value = response.headers.get(CSRF_HEADER)?;
    let text = value.to_str().ok()?.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("required") {
        return None;
    }
    Some(value.clone())
}
