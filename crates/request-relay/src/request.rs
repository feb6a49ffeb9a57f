//! Relay request as sent by the UI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_method() -> String {
    "GET".to_string()
}

/// One request to proxy. Deserialized from the `FETCH_DATA` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Body to send. A JSON string is sent verbatim, any other JSON value
    /// is serialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Caller headers; names are matched case-insensitively.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Browser cookies for the target site (`name=value`, as the shell
    /// reads them). They go into the relay's cookie jar before any request
    /// to the site is sent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
}

impl RelayRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            body: None,
            headers: BTreeMap::new(),
            cookies: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<serde_json::Value>) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            body: Some(body.into()),
            headers: BTreeMap::new(),
            cookies: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookies.push(cookie.into());
        self
    }

    /// Body as wire text.
    pub fn body_text(&self) -> Option<String> {
        match &self.body {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}
