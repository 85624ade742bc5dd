//! Session model: one attempt to scrape a carrier portal.
//!
//! A session has its own lifecycle independent of the job it serves; a job
//! may outlive a failed session and be retried with a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a scraping session.
///
/// The happy path is linear with no cycles:
/// `initializing → waiting_for_login → ready → scraping → completed`.
/// `failed` is an absorbing state reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    WaitingForLogin,
    Ready,
    Scraping,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::WaitingForLogin => "waiting_for_login",
            Self::Ready => "ready",
            Self::Scraping => "scraping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initializing" => Some(Self::Initializing),
            "waiting_for_login" => Some(Self::WaitingForLogin),
            "ready" => Some(Self::Ready),
            "scraping" => Some(Self::Scraping),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal sessions are never reused.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (*self, next) {
            (Initializing, WaitingForLogin)
            | (WaitingForLogin, Ready)
            | (Ready, Scraping)
            | (Scraping, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scraping attempt against a carrier portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Owning job (1:1 in current scope).
    pub job_id: String,
    /// Which portal profile drives tab selection and field extraction.
    pub portal_id: String,
    pub status: SessionStatus,
    /// Provider-side browser allocation handle.
    pub allocation_id: Option<String>,
    /// Last resolved remote-debugging endpoint for the allocation.
    pub connection_endpoint: Option<String>,
    /// Progress counters; monotonically non-decreasing while `scraping`.
    pub current_page: u32,
    pub total_pages: u32,
    /// Count of policy records durably persisted for the owning job.
    pub scraped_count: u64,
    /// Operator-issued stop, honored at the next inter-page check.
    pub stop_requested: bool,
    /// Set only when `status == failed`.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(job_id: impl Into<String>, portal_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            portal_id: portal_id.into(),
            status: SessionStatus::Initializing,
            allocation_id: None,
            connection_endpoint: None,
            current_page: 0,
            total_pages: 0,
            scraped_count: 0,
            stop_requested: false,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
