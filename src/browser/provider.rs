//! Remote browser-automation provider contract.
//!
//! The provider allocates browser instances and exposes them over a
//! remote-debugging endpoint. Allocation can fail transiently; tab state
//! persists across reconnects within one allocation. The core treats the
//! provider as opaque and never performs credential entry through it.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, ScrapeError};

#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Allocate a browser instance, optionally against a named profile.
    /// Returns the allocation id the session owns until terminal release.
    async fn allocate(&self, profile: Option<&str>) -> Result<String>;

    /// Resolve the remote-debugging endpoint for an allocation.
    async fn connection_endpoint(&self, allocation_id: &str) -> Result<String>;

    /// Release the allocation. Failures here are logged by callers, not
    /// propagated; the session outcome is already decided.
    async fn release(&self, allocation_id: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct AllocationResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    endpoint: String,
}

/// Provider implementation over a plain REST API:
/// `POST /allocations`, `GET /allocations/{id}`, `DELETE /allocations/{id}`.
pub struct HttpBrowserProvider {
    api_url: String,
    client: reqwest::Client,
}

impl HttpBrowserProvider {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl BrowserProvider for HttpBrowserProvider {
    async fn allocate(&self, profile: Option<&str>) -> Result<String> {
        let body = serde_json::json!({ "profile": profile });
        let response = self
            .client
            .post(self.url("/allocations"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ScrapeError::Provisioning(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScrapeError::Provisioning(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let allocation: AllocationResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Provisioning(e.to_string()))?;
        debug!(allocation_id = %allocation.id, "browser allocated");
        Ok(allocation.id)
    }

    async fn connection_endpoint(&self, allocation_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/allocations/{allocation_id}")))
            .send()
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScrapeError::Connection(format!(
                "provider returned {} for allocation {allocation_id}",
                response.status()
            )));
        }

        let endpoint: EndpointResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;
        Ok(endpoint.endpoint)
    }

    async fn release(&self, allocation_id: &str) -> Result<()> {
        self.client
            .delete(self.url(&format!("/allocations/{allocation_id}")))
            .send()
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;
        debug!(allocation_id, "browser allocation released");
        Ok(())
    }
}
