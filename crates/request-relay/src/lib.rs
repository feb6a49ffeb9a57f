//! Authenticated request relay for the DocBridge background host.
//!
//! The UI cannot talk to the analytics server directly: requests need the
//! browser's session cookies and, for writes, an anti-forgery token the
//! server only hands out on request. The relay performs the call on the
//! UI's behalf:
//! - merges default headers with the caller's (case-insensitively)
//! - discovers an `X-CSRF-Token` before POSTs
//! - returns the body verbatim, or a classified error

mod error;
mod relay;
mod request;
mod transport;

pub use error::{RelayError, RelayResult};
pub use relay::{merge_headers, AuthenticatedRequestRelay, CSRF_HEADER, ERROR_BODY_LIMIT};
pub use request::RelayRequest;
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};
