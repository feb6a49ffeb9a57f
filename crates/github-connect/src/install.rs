//! Provider install page and the tab-opening seam.

use crate::{ConnectError, ConnectResult};
use async_trait::async_trait;
use url::Url;

/// Opens a browser tab on behalf of the host.
#[async_trait]
pub trait TabOpener: Send + Sync {
    async fn open_tab(&self, url: &Url) -> ConnectResult<()>;
}

/// `https://<provider>/apps/<app-slug>/installations/new?state=<sessionId>`
pub fn install_url(provider_base: &Url, app_slug: &str, session_id: &str) -> ConnectResult<Url> {
    let mut url = provider_base.clone();
    url.path_segments_mut()
        .map_err(|_| {
            ConnectError::Config(format!("Provider URL cannot be a base: {}", provider_base))
        })?
        .pop_if_empty()
        .extend(["apps", app_slug, "installations", "new"]);
    url.query_pairs_mut().clear().append_pair("state", session_id);
    Ok(url)
}
