//! Progress reporting against the supervising session and job rows.
//!
//! Writes are fire-and-forget relative to the extraction pipeline: a failed
//! progress update is logged and scraping continues. `current_page` is
//! reported optimistically before the page's batch write; `scraped_count`
//! is reported strictly after it, so the count never overstates what is
//! durably stored.

use tracing::warn;

use crate::repository::{JobRepository, SessionRepository};

pub struct ProgressReporter {
    sessions: SessionRepository,
    jobs: JobRepository,
}

impl ProgressReporter {
    pub fn new(sessions: SessionRepository, jobs: JobRepository) -> Self {
        Self { sessions, jobs }
    }

    /// Page-level progress, reported as soon as a page's rows are in hand.
    pub fn report_page(&self, session_id: &str, job_id: &str, page: u32, total_pages: u32) {
        if let Err(e) = self.sessions.set_page_progress(session_id, page, total_pages) {
            warn!(session_id, page, "failed to update session page progress: {e}");
        }

        let progress = percentage(page, total_pages);
        if let Err(e) = self.jobs.set_progress(job_id, progress) {
            warn!(job_id, progress, "failed to update job progress: {e}");
        }
    }

    /// Durable record count, reported only after a successful batch write.
    pub fn report_persisted(&self, session_id: &str, job_id: &str, count: u64) {
        if let Err(e) = self.sessions.set_scraped_count(session_id, count) {
            warn!(session_id, count, "failed to update session scraped count: {e}");
        }
        if let Err(e) = self.jobs.set_scraped_records(job_id, count) {
            warn!(job_id, count, "failed to update job scraped records: {e}");
        }
    }
}

fn percentage(page: u32, total_pages: u32) -> u8 {
    if total_pages == 0 {
        return 100;
    }
    ((page as f64 / total_pages as f64) * 100.0).round().min(100.0) as u8
}
