//! Drives the reqwest transport against a loopback HTTP server.

use parking_lot::Mutex;
use request_relay::{AuthenticatedRequestRelay, RelayError, RelayRequest, ReqwestTransport};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Seen {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<Seen> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Seen {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

fn respond(status: &str, extra_headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
    for (name, value) in extra_headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}

/// Analytics-server stand-in: the API path hands out a session cookie,
/// only the origin root hands out a CSRF token, and POSTs need both.
fn route(seen: &Seen) -> String {
    let fetching_token = seen.header("x-csrf-token") == Some("Fetch");
    match (seen.method.as_str(), seen.path.as_str()) {
        ("GET", "/api/stories") if fetching_token => {
            respond("200 OK", &[("Set-Cookie", "session=xyz; Path=/")], "")
        }
        ("GET", "/") if fetching_token => respond("200 OK", &[("X-CSRF-Token", "abc123")], ""),
        ("GET", "/api/stories") => respond("200 OK", &[], r#"{"stories":[]}"#),
        ("POST", "/api/stories") => {
            let has_token = seen.header("x-csrf-token") == Some("abc123");
            let has_cookie = seen
                .header("cookie")
                .map(|c| c.contains("session=xyz"))
                .unwrap_or(false);
            if has_token && has_cookie {
                respond("201 Created", &[], r#"{"id":"story-1"}"#)
            } else {
                respond("403 Forbidden", &[], "CSRF token validation failed")
            }
        }
        _ => respond("404 Not Found", &[], &"missing ".repeat(100)),
    }
}

async fn spawn_server() -> (String, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let log = server_log.clone();
            tokio::spawn(async move {
                if let Some(seen) = read_request(&mut stream).await {
                    let reply = route(&seen);
                    log.lock().push(seen);
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });
        }
    });

    (format!("http://{}", addr), log)
}

#[tokio::test]
async fn test_get_returns_body_verbatim() {
    let (base, log) = spawn_server().await;
    let relay = AuthenticatedRequestRelay::new(Arc::new(ReqwestTransport::new().unwrap()));

    let body = relay
        .perform(&RelayRequest::get(format!("{}/api/stories", base)))
        .await
        .unwrap();

    assert_eq!(body, r#"{"stories":[]}"#);
    let seen = log.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].header("accept"), Some("application/json, text/plain, */*"));
    assert_eq!(seen[0].header("x-requested-with"), Some("XMLHttpRequest"));
}

#[tokio::test]
async fn test_post_discovers_token_and_carries_cookie() {
    let (base, log) = spawn_server().await;
    let relay = AuthenticatedRequestRelay::new(Arc::new(ReqwestTransport::new().unwrap()));

    let body = relay
        .perform(&RelayRequest::post(
            format!("{}/api/stories", base),
            serde_json::json!({"title": "Q3 revenue"}),
        ))
        .await
        .unwrap();

    assert_eq!(body, r#"{"id":"story-1"}"#);

    let seen = log.lock().clone();
    let paths: Vec<(&str, &str)> = seen
        .iter()
        .map(|s| (s.method.as_str(), s.path.as_str()))
        .collect();
    assert_eq!(
        paths,
        vec![("GET", "/api/stories"), ("GET", "/"), ("POST", "/api/stories")]
    );
    assert_eq!(seen[2].body, r#"{"title":"Q3 revenue"}"#);
    assert_eq!(seen[2].header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_error_status_is_classified() {
    let (base, _log) = spawn_server().await;
    let relay = AuthenticatedRequestRelay::new(Arc::new(ReqwestTransport::new().unwrap()));

    let err = relay
        .perform(&RelayRequest::get(format!("{}/nowhere", base)))
        .await
        .unwrap_err();

    match err {
        RelayError::UnexpectedStatus {
            status,
            status_text,
            body,
        } => {
            assert_eq!(status, 404);
            assert_eq!(status_text, "Not Found");
            assert_eq!(body.len(), 200);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = AuthenticatedRequestRelay::new(Arc::new(ReqwestTransport::new().unwrap()));
    let err = relay
        .perform(&RelayRequest::get(format!("http://{}/api", addr)))
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::Http(_)));
}

#[tokio::test]
async fn test_browser_cookies_ride_along_on_every_request() {
    let (base, log) = spawn_server().await;
    let relay = AuthenticatedRequestRelay::new(Arc::new(ReqwestTransport::new().unwrap()));

    relay
        .perform(
            &RelayRequest::post(format!("{}/api/stories", base), serde_json::json!({}))
                .with_cookie("sso=browser-session"),
        )
        .await
        .unwrap();

    let seen = log.lock().clone();
    assert_eq!(seen.len(), 3);
    for request in &seen {
        assert!(
            request
                .header("cookie")
                .is_some_and(|cookie| cookie.contains("sso=browser-session")),
            "{} {} went out without the browser session",
            request.method,
            request.path
        );
    }
}
