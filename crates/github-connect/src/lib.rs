//! GitHub App connect flow for the DocBridge background host.
//!
//! This crate provides:
//! - An explicit FSM for the connect states
//! - Cryptographically random session ids
//! - The handshake poll loop, bounded and resumable after a host restart
//! - `ConnectFlowController`, which persists and broadcasts every transition

mod connect_fsm;
mod controller;
mod error;
mod flow_state;
mod handshake;
mod install;
mod resume_guard;
mod scheduler;
mod session_id;

pub use connect_fsm::connect_machine;
pub use connect_fsm::{next_status, ConnectInput, ConnectMachine, ConnectMachineState, PollConfig};
pub use controller::{ConnectFlowController, ConnectionSummary, ProviderApp, StartHandle};
pub use error::{ConnectError, ConnectResult};
pub use flow_state::{Advance, FlowState};
pub use handshake::{classify_response, HandshakeClient, HttpHandshakePoller, PollOutcome};
pub use install::{install_url, TabOpener};
pub use resume_guard::{HostEvent, ResumeGuard};
pub use scheduler::{PollExit, PollScheduler};
pub use session_id::{generate_session_id, SESSION_ID_BYTES};
