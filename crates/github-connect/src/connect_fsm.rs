//! Connect-flow state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!   Idle ──Start──► Starting ──InstallPageOpened──► WaitingForInstall
//!                      │                                   │
//!                      │ Fail                              │ PollPending
//!                      ▼                                   ▼
//!                    Error ◄──Fail / TimedOut──────────  Polling ──┐
//!                                                          │       │ PollPending
//!                                                          │ ◄─────┘
//!                                                          │ Authorized
//!                                                          ▼
//!                                                      Connected
//! ```
//!
//! `Start` is accepted from every state: a new session always supersedes the
//! previous one. `CallbackSeen` only records a timestamp and keeps the state.

use bridge_config_and_utils::Config;
use bridge_storage::ConnectStatus;
use rust_fsm::*;
use std::time::Duration;

use crate::{ConnectError, ConnectResult};

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub connect_machine(Idle)

    Idle => {
        Start => Starting
    },
    Starting => {
        Start => Starting,
        InstallPageOpened => WaitingForInstall,
        Fail => Error
    },
    WaitingForInstall => {
        Start => Starting,
        PollPending => Polling,
        Authorized => Connected,
        Fail => Error,
        TimedOut => Error,
        CallbackSeen => WaitingForInstall
    },
    Polling => {
        Start => Starting,
        PollPending => Polling,
        Authorized => Connected,
        Fail => Error,
        TimedOut => Error,
        CallbackSeen => Polling
    },
    Connected => {
        Start => Starting
    },
    Error => {
        Start => Starting
    }
}

pub use connect_machine::Input as ConnectInput;
pub use connect_machine::State as ConnectMachineState;
pub use connect_machine::StateMachine as ConnectMachine;

impl From<ConnectStatus> for ConnectMachineState {
    fn from(status: ConnectStatus) -> Self {
        match status {
            ConnectStatus::Idle => Self::Idle,
            ConnectStatus::Starting => Self::Starting,
            ConnectStatus::WaitingForInstall => Self::WaitingForInstall,
            ConnectStatus::Polling => Self::Polling,
            ConnectStatus::Connected => Self::Connected,
            ConnectStatus::Error => Self::Error,
        }
    }
}

impl From<ConnectMachineState> for ConnectStatus {
    fn from(state: ConnectMachineState) -> Self {
        match state {
            ConnectMachineState::Idle => Self::Idle,
            ConnectMachineState::Starting => Self::Starting,
            ConnectMachineState::WaitingForInstall => Self::WaitingForInstall,
            ConnectMachineState::Polling => Self::Polling,
            ConnectMachineState::Connected => Self::Connected,
            ConnectMachineState::Error => Self::Error,
        }
    }
}

/// Status reached by applying `input` in `from`.
pub fn next_status(from: ConnectStatus, input: ConnectInput) -> ConnectResult<ConnectStatus> {
    let mut machine = ConnectMachine::from_state(from.into());
    machine.consume(&input).map_err(|_| {
        ConnectError::InvalidStateTransition(format!("Cannot apply {:?} in state {}", input, from))
    })?;
    Ok(ConnectStatus::from(*machine.state()))
}

/// Cadence and bound of the handshake poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between two attempts.
    pub interval: Duration,
    /// Highest attempt index; attempts run `0..=max_attempt`.
    pub max_attempt: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(bridge_config_and_utils::DEFAULT_POLL_INTERVAL_MS),
            max_attempt: bridge_config_and_utils::DEFAULT_POLL_MAX_ATTEMPT,
        }
    }
}

impl PollConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempt: config.poll_max_attempt,
        }
    }

    /// Message persisted when every attempt came back pending.
    pub fn timeout_message(&self) -> String {
        format!("Polling timed out after {} attempts", self.max_attempt)
    }
}
