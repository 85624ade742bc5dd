//! Browser connection manager.
//!
//! Turns a claimed session into a live tab positioned on the target portal:
//! resolves the allocation's remote-debugging endpoint with bounded retry,
//! connects over CDP, and locates (or navigates to) the portal tab.
//! Authentication is exclusively the human operator's responsibility prior
//! to `confirm-ready`; this module never touches credentials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{PortalSettings, ProviderSettings};
use crate::error::{Result, ScrapeError};
use crate::models::Session;
use crate::scrape::{PortalClient, PortalConnector};

use super::portal::BrowserPortalClient;
use super::provider::BrowserProvider;

/// Poll interval while waiting for a portal marker to appear.
const MARKER_POLL_MS: u64 = 500;

/// Resolve the remote-debugging endpoint for an allocation, retrying up to
/// `attempts` times with a fixed `delay` between attempts. Exhaustion
/// surfaces the last underlying error.
pub async fn resolve_endpoint(
    provider: &dyn BrowserProvider,
    allocation_id: &str,
    attempts: u32,
    delay: Duration,
) -> Result<String> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match provider.connection_endpoint(allocation_id).await {
            Ok(endpoint) => {
                debug!(allocation_id, attempt, "resolved debugging endpoint");
                return Ok(endpoint);
            }
            Err(e) => {
                warn!(
                    allocation_id,
                    attempt, attempts, "endpoint resolution failed: {e}"
                );
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ScrapeError::Connection(format!(
        "endpoint unavailable after {attempts} attempts: {last_error}"
    )))
}

/// Allocate a remote browser, retrying up to `attempts` times with a fixed
/// `delay` between attempts. Allocation failures are transient on the
/// provider side; exhaustion surfaces the last underlying error as a
/// provisioning failure.
pub async fn allocate_browser(
    provider: &dyn BrowserProvider,
    profile: Option<&str>,
    attempts: u32,
    delay: Duration,
) -> Result<String> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match provider.allocate(profile).await {
            Ok(allocation_id) => {
                debug!(allocation_id, attempt, "allocated remote browser");
                return Ok(allocation_id);
            }
            Err(e) => {
                warn!(attempt, attempts, "browser allocation failed: {e}");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ScrapeError::Provisioning(format!(
        "browser unavailable after {attempts} attempts: {last_error}"
    )))
}

/// CDP-backed connector used by the worker loop.
pub struct CdpConnector {
    provider: Arc<dyn BrowserProvider>,
    provider_settings: ProviderSettings,
    portal: PortalSettings,
}

impl CdpConnector {
    pub fn new(
        provider: Arc<dyn BrowserProvider>,
        provider_settings: ProviderSettings,
        portal: PortalSettings,
    ) -> Self {
        Self {
            provider,
            provider_settings,
            portal,
        }
    }

    /// Connect to the browser behind `endpoint` and spawn its event handler.
    async fn connect_browser(&self, endpoint: &str) -> Result<Browser> {
        let ws_url = resolve_ws_url(endpoint).await?;
        debug!("connecting to websocket: {ws_url}");

        let (browser, mut handler) = Browser::connect(&ws_url)
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Select the first open tab on the portal domain, or reuse the first
    /// available tab and navigate it to the landing URL.
    async fn locate_portal_tab(&self, browser: &Browser) -> Result<Page> {
        let pages = browser
            .pages()
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;

        for page in &pages {
            if let Ok(Some(current)) = page.url().await {
                if url_on_domain(&current.to_string(), &self.portal.domain) {
                    info!(url = %current, "reusing open portal tab");
                    return Ok(page.clone());
                }
            }
        }

        let page = match pages.into_iter().next() {
            Some(page) => page,
            None => browser
                .new_page("about:blank")
                .await
                .map_err(|e| ScrapeError::Connection(e.to_string()))?,
        };

        info!(url = %self.portal.landing_url, "navigating tab to portal landing page");
        let nav = NavigateParams::builder()
            .url(self.portal.landing_url.clone())
            .build()
            .map_err(|e| ScrapeError::Connection(format!("invalid landing url: {e}")))?;
        page.execute(nav)
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;

        self.await_portal_signal(&page).await?;
        Ok(page)
    }

    /// Wait for either the "data present" or "login form" marker. Neither
    /// appearing within the timeout means the portal is unreachable.
    async fn await_portal_signal(&self, page: &Page) -> Result<()> {
        let markers: Vec<&str> = [
            self.portal.data_marker.as_deref(),
            self.portal.login_marker.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if markers.is_empty() {
            // No structural signal configured; fall back to the settle bound.
            tokio::time::sleep(Duration::from_millis(self.portal.settle_ms)).await;
            return Ok(());
        }

        let deadline = Instant::now() + Duration::from_secs(self.portal.marker_timeout_secs);
        loop {
            for marker in &markers {
                if page.find_element(*marker).await.is_ok() {
                    debug!(marker, "portal signal present");
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::PortalUnreachable(format!(
                    "neither data nor login marker appeared within {}s",
                    self.portal.marker_timeout_secs
                )));
            }
            tokio::time::sleep(Duration::from_millis(MARKER_POLL_MS)).await;
        }
    }
}

#[async_trait]
impl PortalConnector for CdpConnector {
    async fn connect(&self, session: &Session) -> Result<Box<dyn PortalClient>> {
        let allocation_id = session.allocation_id.as_deref().ok_or_else(|| {
            ScrapeError::Connection("session has no browser allocation".to_string())
        })?;

        let endpoint = resolve_endpoint(
            self.provider.as_ref(),
            allocation_id,
            self.provider_settings.retry_attempts,
            Duration::from_secs(self.provider_settings.retry_delay_secs),
        )
        .await?;

        let browser = self.connect_browser(&endpoint).await?;
        let page = self.locate_portal_tab(&browser).await?;

        Ok(Box::new(BrowserPortalClient::new(
            browser,
            page,
            self.portal.clone(),
        )))
    }
}

/// Resolve the actual `webSocketDebuggerUrl` from a debugging endpoint's
/// `/json/version` document.
async fn resolve_ws_url(endpoint: &str) -> Result<String> {
    let http_url = endpoint
        .replace("ws://", "http://")
        .replace("wss://", "https://");
    let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

    let client = reqwest::Client::new();
    let resp: serde_json::Value = client
        .get(&version_url)
        .send()
        .await
        .map_err(|e| ScrapeError::Connection(format!("version probe failed: {e}")))?
        .json()
        .await
        .map_err(|e| ScrapeError::Connection(format!("invalid version document: {e}")))?;

    resp.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ScrapeError::Connection("no webSocketDebuggerUrl in version document".to_string())
        })
}

/// Match a tab URL against the portal domain (exact host or subdomain).
fn url_on_domain(candidate: &str, domain: &str) -> bool {
    let Ok(parsed) = url::Url::parse(candidate) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    host == domain || host.ends_with(&format!(".{domain}"))
}
