//! Re-arms polling whenever the host process comes up.

use crate::controller::ConnectFlowController;
use crate::scheduler::PollExit;
use crate::ConnectResult;
use tokio::task::JoinHandle;
use tracing::info;

/// Lifecycle event that brought the host up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// Browser or host process start.
    Startup,
    /// Extension installed or updated.
    Installed,
}

/// Runs on every host start and resumes a session left mid-flight.
pub struct ResumeGuard {
    controller: ConnectFlowController,
}

impl ResumeGuard {
    pub fn new(controller: ConnectFlowController) -> Self {
        Self { controller }
    }

    pub fn on_host_event(
        &self,
        event: HostEvent,
    ) -> ConnectResult<Option<JoinHandle<ConnectResult<PollExit>>>> {
        info!(event = ?event, "Host lifecycle event");
        self.controller.resume()
    }
}
