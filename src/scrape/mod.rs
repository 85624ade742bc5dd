//! The scraping pipeline: pagination driving, field extraction, batched
//! persistence, and progress reporting.
//!
//! The browser side is reached through the `PortalClient`/`PortalConnector`
//! seams so the pipeline can be exercised without a live CDP connection.

mod extractor;
mod pagination;
mod persister;
mod progress;

pub use extractor::{extractor_for_portal, FieldExtractor, LabeledFieldExtractor};
pub use pagination::{PaginationDriver, ScrapeSummary};
pub use persister::BatchPersister;
pub use progress::ProgressReporter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{PolicyRecord, Session};

/// One summary row as pulled from the results table, before field
/// extraction. `detail_text` is the raw inner text of the co-located detail
/// panel; `None` when the panel was absent (the record is still emitted).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPolicyRow {
    pub policy_number: String,
    #[serde(default)]
    pub applicant_name: String,
    #[serde(default)]
    pub plan_name: String,
    #[serde(default)]
    pub face_amount: String,
    #[serde(default)]
    pub premium: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub updated_date: String,
    #[serde(default)]
    pub detail_text: Option<String>,
}

/// A connected tab positioned on the portal, able to navigate the paginated
/// result set and pull raw rows off the current page.
#[async_trait]
pub trait PortalClient: Send {
    /// Total page count as reported by the portal's pagination control on
    /// the current page. Callers clamp this to the configured maximum.
    async fn total_pages(&mut self) -> Result<u32>;

    /// Navigate to the given results page and wait for it to settle.
    /// Returns `false` when no URL/link for that page is resolvable; fewer
    /// pages than expected is not a failure.
    async fn goto_page(&mut self, page: u32) -> Result<bool>;

    /// Extract all summary rows (with co-located detail text) from the
    /// current page, in DOM order.
    async fn extract_rows(&mut self) -> Result<Vec<RawPolicyRow>>;
}

/// Produces a connected `PortalClient` for a claimed session. The CDP
/// implementation lives in `browser::connection`.
#[async_trait]
pub trait PortalConnector: Send + Sync {
    async fn connect(&self, session: &Session) -> Result<Box<dyn PortalClient>>;
}

/// Durable destination for extracted records. Implemented by
/// `BatchPersister`; tests substitute failing sinks to exercise the
/// abort-on-batch-failure path.
pub trait RecordSink: Send + Sync {
    /// Persist one page worth of records. Returns the number persisted.
    fn persist_page(&self, job_id: &str, page: u32, records: &[PolicyRecord]) -> Result<usize>;
}
