//! Opens browser tabs by asking the UI shell over stdout.

use crate::protocol::{Notification, Outbound};
use async_trait::async_trait;
use github_connect::{ConnectError, ConnectResult, TabOpener};
use tokio::sync::mpsc;
use url::Url;

/// Emits `OPEN_TAB` on the outbound channel.
#[derive(Clone)]
pub struct HostTabOpener {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl HostTabOpener {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl TabOpener for HostTabOpener {
    async fn open_tab(&self, url: &Url) -> ConnectResult<()> {
        self.outbound
            .send(Outbound::Notification(Notification::OpenTab {
                url: url.to_string(),
            }))
            .map_err(|_| ConnectError::TabOpen("host output is closed".to_string()))
    }
}
