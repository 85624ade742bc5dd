//! Worker loop: polls for ready sessions, claims one, and drives its
//! scraping pipeline to a terminal state.
//!
//! Sessions run strictly one at a time per worker. Multiple worker
//! instances are safe to run against the same database; the conditional
//! claim in the session repository lets exactly one win each session.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::browser::BrowserProvider;
use crate::config::Settings;
use crate::error::Result;
use crate::models::Session;
use crate::repository::{JobRepository, PolicyRepository, SessionRepository};
use crate::scrape::{
    extractor_for_portal, BatchPersister, PaginationDriver, PortalConnector, ProgressReporter,
    ScrapeSummary,
};
use crate::services::SessionService;

pub struct Worker {
    settings: Settings,
    sessions: SessionRepository,
    jobs: JobRepository,
    records: PolicyRepository,
    service: SessionService,
    connector: Arc<dyn PortalConnector>,
    provider: Arc<dyn BrowserProvider>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        sessions: SessionRepository,
        jobs: JobRepository,
        records: PolicyRepository,
        service: SessionService,
        connector: Arc<dyn PortalConnector>,
        provider: Arc<dyn BrowserProvider>,
    ) -> Self {
        Self {
            settings,
            sessions,
            jobs,
            records,
            service,
            connector,
            provider,
        }
    }

    /// Poll until interrupted. Each tick handles at most one session.
    pub async fn run(&self) -> Result<()> {
        let interval = Duration::from_secs(self.settings.worker.poll_interval_secs);
        info!(
            poll_interval_secs = self.settings.worker.poll_interval_secs,
            "worker started"
        );

        loop {
            match self.tick().await {
                Ok(Some(session_id)) => {
                    info!(session_id, "session reached a terminal state");
                }
                Ok(None) => {}
                Err(e) => {
                    error!("worker tick failed: {e}");
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One poll cycle: claim the oldest ready session, if any, and drive it
    /// to completion or failure. Returns the session id when one was run.
    pub async fn tick(&self) -> Result<Option<String>> {
        let Some(session) = self.sessions.oldest_ready()? else {
            return Ok(None);
        };

        // Another worker may have won the session since we read it.
        if !self.service.claim_for_scraping(&session.id)? {
            return Ok(None);
        }
        let session = self.service.get(&session.id)?;
        info!(session_id = %session.id, job_id = %session.job_id, "claimed session");

        let outcome = match self.run_session(&session).await {
            Ok(summary) if summary.stopped => {
                self.service.fail(&session.id, "stopped by operator")
            }
            Ok(summary) => self
                .service
                .complete(&session.id, summary.records_persisted),
            Err(e) => self.service.fail(&session.id, &e.to_string()),
        };

        // The allocation is released even when the terminal update errored;
        // the remote browser must not outlive the session.
        self.release_allocation(&session).await;
        outcome?;
        Ok(Some(session.id))
    }

    async fn run_session(&self, session: &Session) -> Result<ScrapeSummary> {
        let client = self.connector.connect(session).await?;

        let extractor = extractor_for_portal(&session.portal_id);
        let persister =
            BatchPersister::new(self.records.clone(), self.settings.worker.batch_size);
        let reporter = ProgressReporter::new(self.sessions.clone(), self.jobs.clone());

        let mut driver = PaginationDriver::new(
            client,
            &extractor,
            &persister,
            &reporter,
            &self.sessions,
            self.settings.portal.max_pages,
        );
        driver.run(session).await
    }

    /// Release the session's browser allocation. Failures are logged only;
    /// the session outcome is already recorded.
    async fn release_allocation(&self, session: &Session) {
        let Some(allocation_id) = session.allocation_id.as_deref() else {
            return;
        };
        if let Err(e) = self.provider.release(allocation_id).await {
            warn!(
                session_id = %session.id,
                allocation_id,
                "failed to release allocation: {e}"
            );
        }
    }
}
