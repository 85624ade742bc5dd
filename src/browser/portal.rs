//! Portal client over a live CDP tab.
//!
//! All reads happen through evaluated JavaScript returning JSON, so the DOM
//! shape knowledge stays in one place. Rows are returned in DOM order; a
//! missing detail panel yields `detail_text: None` and the row is still
//! emitted.

use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, Page};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PortalSettings;
use crate::error::{Result, ScrapeError};
use crate::scrape::{PortalClient, RawPolicyRow};

use async_trait::async_trait;

/// Poll interval while waiting for the data marker after navigation.
const SETTLE_POLL_MS: u64 = 500;

/// Reads the portal's pagination control. Prefers an explicit
/// `data-total-pages` attribute; falls back to the largest numbered page
/// link; a page with no pagination control is a single page.
const TOTAL_PAGES_JS: &str = r#"
(() => {
    const tagged = document.querySelector('[data-total-pages]');
    if (tagged) {
        const n = parseInt(tagged.getAttribute('data-total-pages'), 10);
        if (Number.isFinite(n) && n > 0) return n;
    }
    let max = 0;
    for (const a of document.querySelectorAll('.pagination a[data-page]')) {
        const n = parseInt(a.getAttribute('data-page'), 10);
        if (Number.isFinite(n) && n > max) max = n;
    }
    return max > 0 ? max : 1;
})()
"#;

/// Pulls every summary row plus its co-located detail panel text. The row
/// and detail id prefixes are substituted in before evaluation.
const EXTRACT_ROWS_JS: &str = r#"
(() => {
    const rows = [];
    for (const tr of document.querySelectorAll("tr[id^='__ROW_PREFIX__']")) {
        const policyNumber = tr.id.slice('__ROW_PREFIX__'.length);
        if (!policyNumber) continue;
        const cells = tr.querySelectorAll('td');
        const text = (i) => cells[i] ? cells[i].innerText.trim() : '';
        const detail = document.getElementById('__DETAIL_PREFIX__' + policyNumber);
        rows.push({
            policy_number: policyNumber,
            applicant_name: text(1),
            plan_name: text(2),
            face_amount: text(3),
            premium: text(4),
            status: text(5),
            updated_date: text(6),
            detail_text: detail ? detail.innerText : null,
        });
    }
    return JSON.stringify(rows);
})()
"#;

/// What `goto_page` should do with the tab for a given results page.
#[derive(Debug, PartialEq)]
enum PageStep {
    /// Scrape the page the tab is already showing.
    Stay,
    /// Navigate to a page-numbered results URL first.
    Navigate(String),
    /// No way to reach this page; pagination ends here.
    Exhausted,
}

/// Page 1 is always scraped where the tab already sits: the connection
/// manager (or the operator) positioned it, and re-navigating would discard
/// any operator-applied filters or view state. Later pages need a
/// page-numbered URL.
fn plan_page_step(portal: &PortalSettings, page: u32) -> PageStep {
    if page <= 1 {
        return PageStep::Stay;
    }
    match portal.page_url(page) {
        Some(url) => PageStep::Navigate(url),
        None => PageStep::Exhausted,
    }
}

pub struct BrowserPortalClient {
    // Held so the CDP connection outlives the page handle.
    _browser: Browser,
    page: Page,
    portal: PortalSettings,
}

impl BrowserPortalClient {
    pub fn new(browser: Browser, page: Page, portal: PortalSettings) -> Self {
        Self {
            _browser: browser,
            page,
            portal,
        }
    }

    /// Wait for the page to settle after navigation: poll the data marker
    /// when one is configured, otherwise sleep the fixed settle delay.
    /// Marker timeout is non-fatal; extraction on a slow page simply finds
    /// fewer rows.
    async fn wait_settled(&self) -> Result<()> {
        let Some(marker) = self.portal.data_marker.as_deref() else {
            tokio::time::sleep(Duration::from_millis(self.portal.settle_ms)).await;
            return Ok(());
        };

        let deadline = Instant::now() + Duration::from_secs(self.portal.marker_timeout_secs);
        while Instant::now() < deadline {
            if self.page.find_element(marker).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(SETTLE_POLL_MS)).await;
        }
        warn!(
            marker,
            timeout_secs = self.portal.marker_timeout_secs,
            "data marker did not appear; extracting anyway"
        );
        Ok(())
    }

    async fn evaluate_string(&self, script: &str) -> Result<String> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| ScrapeError::Extraction(e.to_string()))?;
        result
            .into_value::<String>()
            .map_err(|e| ScrapeError::Extraction(format!("script returned non-string: {e}")))
    }
}

#[async_trait]
impl PortalClient for BrowserPortalClient {
    async fn total_pages(&mut self) -> Result<u32> {
        let result = self
            .page
            .evaluate(TOTAL_PAGES_JS.to_string())
            .await
            .map_err(|e| ScrapeError::Extraction(e.to_string()))?;
        let total: u32 = result
            .into_value()
            .map_err(|e| ScrapeError::Extraction(format!("bad page count: {e}")))?;
        debug!(total, "portal reports total pages");
        Ok(total.max(1))
    }

    async fn goto_page(&mut self, page: u32) -> Result<bool> {
        let url = match plan_page_step(&self.portal, page) {
            PageStep::Stay => return Ok(true),
            PageStep::Exhausted => return Ok(false),
            PageStep::Navigate(url) => url,
        };

        debug!(page, %url, "navigating to results page");
        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| ScrapeError::Connection(format!("invalid results url: {e}")))?;
        self.page
            .execute(nav)
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;

        self.wait_settled().await?;
        Ok(true)
    }

    async fn extract_rows(&mut self) -> Result<Vec<RawPolicyRow>> {
        let script = EXTRACT_ROWS_JS
            .replace("__ROW_PREFIX__", &self.portal.row_id_prefix)
            .replace("__DETAIL_PREFIX__", &self.portal.detail_id_prefix);

        let json = self.evaluate_string(&script).await?;
        let rows: Vec<RawPolicyRow> = serde_json::from_str(&json)
            .map_err(|e| ScrapeError::Extraction(format!("row payload did not parse: {e}")))?;
        debug!(count = rows.len(), "extracted rows from current page");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_never_navigates() {
        // Even with page-numbered URLs configured, page 1 is scraped in
        // place so operator-applied view state survives.
        let mut portal = PortalSettings::default();
        portal.results_url = Some("https://portal.example/policies?page={page}".to_string());
        assert_eq!(plan_page_step(&portal, 1), PageStep::Stay);
    }

    #[test]
    fn later_pages_navigate_to_numbered_urls() {
        let mut portal = PortalSettings::default();
        portal.results_url = Some("https://portal.example/policies?page={page}".to_string());
        assert_eq!(
            plan_page_step(&portal, 3),
            PageStep::Navigate("https://portal.example/policies?page=3".to_string())
        );
    }

    #[test]
    fn pagination_ends_without_numbered_urls() {
        let portal = PortalSettings::default();
        assert_eq!(plan_page_step(&portal, 1), PageStep::Stay);
        assert_eq!(plan_page_step(&portal, 2), PageStep::Exhausted);
    }
}
