//! Pagination driver: walks an N-page result set in page order, extracting
//! and persisting each page before moving to the next.
//!
//! Pages are strictly sequential (each needs the prior navigation to
//! complete). Records within a page preserve DOM order. An operator stop is
//! honored between pages only; it never interrupts an in-flight extraction.

use tracing::{debug, info};

use crate::error::Result;
use crate::models::{PolicyRecord, Session};
use crate::repository::SessionRepository;

use super::{FieldExtractor, PortalClient, ProgressReporter, RecordSink};

/// Outcome of driving one session's pagination to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Last page actually processed (0 when no page was reached).
    pub pages_processed: u32,
    /// Page count the portal reported, after clamping.
    pub total_pages: u32,
    /// Records durably persisted across all pages.
    pub records_persisted: u64,
    /// Whether the run ended because the operator requested a stop.
    pub stopped: bool,
}

pub struct PaginationDriver<'a> {
    client: Box<dyn PortalClient>,
    extractor: &'a dyn FieldExtractor,
    sink: &'a dyn RecordSink,
    reporter: &'a ProgressReporter,
    sessions: &'a SessionRepository,
    max_pages: u32,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(
        client: Box<dyn PortalClient>,
        extractor: &'a dyn FieldExtractor,
        sink: &'a dyn RecordSink,
        reporter: &'a ProgressReporter,
        sessions: &'a SessionRepository,
        max_pages: u32,
    ) -> Self {
        Self {
            client,
            extractor,
            sink,
            reporter,
            sessions,
            max_pages,
        }
    }

    /// Produce the ordered union of all pages' records for the session.
    /// Per-record extraction problems degrade to partial records; a batch
    /// write failure propagates and aborts the run from that page on.
    pub async fn run(&mut self, session: &Session) -> Result<ScrapeSummary> {
        let reported = self.client.total_pages().await?;
        let total_pages = reported.min(self.max_pages);
        if reported > self.max_pages {
            info!(
                session_id = %session.id,
                reported,
                clamped = total_pages,
                "portal reported more pages than the configured maximum"
            );
        }

        let mut persisted: u64 = 0;
        let mut pages_processed: u32 = 0;

        for page in 1..=total_pages {
            // Operator stop is a state check between operations, nothing more.
            if self.sessions.stop_requested(&session.id).unwrap_or(false) {
                info!(session_id = %session.id, page, "stop requested; halting before next page");
                return Ok(ScrapeSummary {
                    pages_processed,
                    total_pages,
                    records_persisted: persisted,
                    stopped: true,
                });
            }

            if !self.client.goto_page(page).await? {
                // Fewer pages than expected is not a failure.
                debug!(session_id = %session.id, page, "no further page resolvable; ending early");
                break;
            }

            let rows = self.client.extract_rows().await?;
            pages_processed = page;

            // Optimistic page progress, independent of downstream persistence.
            self.reporter
                .report_page(&session.id, &session.job_id, page, total_pages);

            let records: Vec<PolicyRecord> = rows
                .iter()
                .map(|raw| self.extractor.extract(&session.job_id, page, raw))
                .collect();

            let written = self.sink.persist_page(&session.job_id, page, &records)?;
            persisted += written as u64;

            // Durable count only after the batch write succeeded.
            self.reporter
                .report_persisted(&session.id, &session.job_id, persisted);

            debug!(
                session_id = %session.id,
                page,
                rows = rows.len(),
                persisted,
                "page complete"
            );
        }

        Ok(ScrapeSummary {
            pages_processed,
            total_pages,
            records_persisted: persisted,
            stopped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::models::Job;
    use crate::repository::{JobRepository, PolicyRepository};
    use crate::scrape::{extractor_for_portal, BatchPersister, RawPolicyRow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Scripted portal: a fixed row count per page, tracking navigation.
    struct ScriptedPortal {
        rows_per_page: Vec<usize>,
        pages_loaded: Arc<AtomicU32>,
        current: usize,
    }

    impl ScriptedPortal {
        fn new(rows_per_page: Vec<usize>) -> (Self, Arc<AtomicU32>) {
            let loaded = Arc::new(AtomicU32::new(0));
            (
                Self {
                    rows_per_page,
                    pages_loaded: loaded.clone(),
                    current: 0,
                },
                loaded,
            )
        }
    }

    #[async_trait]
    impl PortalClient for ScriptedPortal {
        async fn total_pages(&mut self) -> crate::error::Result<u32> {
            Ok(self.rows_per_page.len() as u32)
        }

        async fn goto_page(&mut self, page: u32) -> crate::error::Result<bool> {
            if page as usize > self.rows_per_page.len() {
                return Ok(false);
            }
            self.current = page as usize - 1;
            self.pages_loaded.store(page, Ordering::SeqCst);
            Ok(true)
        }

        async fn extract_rows(&mut self) -> crate::error::Result<Vec<RawPolicyRow>> {
            let count = self.rows_per_page[self.current];
            Ok((0..count)
                .map(|i| RawPolicyRow {
                    policy_number: format!("{:02}{:05}", self.current + 1, i),
                    applicant_name: "Scripted Holder".to_string(),
                    detail_text: Some("Gender: F\nAge: 50".to_string()),
                    ..Default::default()
                })
                .collect())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        sessions: SessionRepository,
        jobs: JobRepository,
        records: PolicyRepository,
        session: Session,
        job: Job,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.db");
        let sessions = SessionRepository::new(&db).unwrap();
        let jobs = JobRepository::new(&db).unwrap();
        let records = PolicyRepository::new(&db).unwrap();

        let job = Job::new("pagination test");
        jobs.insert(&job).unwrap();
        let mut session = Session::new(&job.id, "keystone");
        session.status = crate::models::SessionStatus::Scraping;
        sessions.insert(&session).unwrap();

        Fixture {
            _dir: dir,
            sessions,
            jobs,
            records,
            session,
            job,
        }
    }

    #[tokio::test]
    async fn three_pages_with_uneven_rows() {
        let fx = fixture();
        let (portal, _loaded) = ScriptedPortal::new(vec![2, 0, 5]);
        let extractor = extractor_for_portal("keystone");
        let persister = BatchPersister::new(fx.records.clone(), 50);
        let reporter = ProgressReporter::new(fx.sessions.clone(), fx.jobs.clone());

        let mut driver = PaginationDriver::new(
            Box::new(portal),
            &extractor,
            &persister,
            &reporter,
            &fx.sessions,
            50,
        );
        let summary = driver.run(&fx.session).await.unwrap();

        assert_eq!(summary.records_persisted, 7);
        assert_eq!(summary.pages_processed, 3);
        assert!(!summary.stopped);

        // Persisted count matches the sum of per-page extractions.
        assert_eq!(fx.records.count_by_job(&fx.job.id).unwrap(), 7);

        let session = fx.sessions.get(&fx.session.id).unwrap().unwrap();
        assert_eq!(session.current_page, 3);
        assert_eq!(session.scraped_count, 7);
    }

    #[tokio::test]
    async fn early_termination_when_page_unresolvable() {
        let fx = fixture();
        // Portal claims 4 pages but only 2 resolve.
        struct Truncated(ScriptedPortal);
        #[async_trait]
        impl PortalClient for Truncated {
            async fn total_pages(&mut self) -> crate::error::Result<u32> {
                Ok(4)
            }
            async fn goto_page(&mut self, page: u32) -> crate::error::Result<bool> {
                if page > 2 {
                    return Ok(false);
                }
                self.0.goto_page(page).await
            }
            async fn extract_rows(&mut self) -> crate::error::Result<Vec<RawPolicyRow>> {
                self.0.extract_rows().await
            }
        }

        let (portal, _) = ScriptedPortal::new(vec![3, 3]);
        let extractor = extractor_for_portal("keystone");
        let persister = BatchPersister::new(fx.records.clone(), 50);
        let reporter = ProgressReporter::new(fx.sessions.clone(), fx.jobs.clone());

        let mut driver = PaginationDriver::new(
            Box::new(Truncated(portal)),
            &extractor,
            &persister,
            &reporter,
            &fx.sessions,
            50,
        );
        let summary = driver.run(&fx.session).await.unwrap();

        // Fewer pages than expected is not a failure.
        assert_eq!(summary.pages_processed, 2);
        assert_eq!(summary.records_persisted, 6);
        assert!(!summary.stopped);
    }

    #[tokio::test]
    async fn batch_failure_aborts_but_keeps_prior_pages() {
        let fx = fixture();

        /// Sink that persists page 1 and fails on page 2.
        struct FailOnPageTwo {
            inner: BatchPersister,
        }
        impl RecordSink for FailOnPageTwo {
            fn persist_page(
                &self,
                job_id: &str,
                page: u32,
                records: &[PolicyRecord],
            ) -> crate::error::Result<usize> {
                if page >= 2 {
                    return Err(ScrapeError::Extraction(
                        "simulated batch write failure".to_string(),
                    ));
                }
                self.inner.persist_page(job_id, page, records)
            }
        }

        let (portal, loaded) = ScriptedPortal::new(vec![4, 4, 4, 4, 4]);
        let extractor = extractor_for_portal("keystone");
        let sink = FailOnPageTwo {
            inner: BatchPersister::new(fx.records.clone(), 50),
        };
        let reporter = ProgressReporter::new(fx.sessions.clone(), fx.jobs.clone());

        let mut driver = PaginationDriver::new(
            Box::new(portal),
            &extractor,
            &sink,
            &reporter,
            &fx.sessions,
            50,
        );
        let err = driver.run(&fx.session).await.unwrap_err();
        assert!(err.to_string().contains("simulated batch write failure"));

        // Page 1's records remain durable; pages 3-5 were never attempted.
        assert_eq!(fx.records.count_by_job(&fx.job.id).unwrap(), 4);
        assert_eq!(loaded.load(Ordering::SeqCst), 2);

        // Durable count was only advanced through page 1.
        let session = fx.sessions.get(&fx.session.id).unwrap().unwrap();
        assert_eq!(session.scraped_count, 4);
    }

    #[tokio::test]
    async fn stop_request_halts_before_next_page() {
        let fx = fixture();

        /// Portal that raises the stop flag while serving page 1.
        struct StopAfterFirst {
            inner: ScriptedPortal,
            sessions: SessionRepository,
            session_id: String,
        }
        #[async_trait]
        impl PortalClient for StopAfterFirst {
            async fn total_pages(&mut self) -> crate::error::Result<u32> {
                self.inner.total_pages().await
            }
            async fn goto_page(&mut self, page: u32) -> crate::error::Result<bool> {
                self.inner.goto_page(page).await
            }
            async fn extract_rows(&mut self) -> crate::error::Result<Vec<RawPolicyRow>> {
                self.sessions.request_stop(&self.session_id).unwrap();
                self.inner.extract_rows().await
            }
        }

        let (portal, loaded) = ScriptedPortal::new(vec![2, 2, 2]);
        let extractor = extractor_for_portal("keystone");
        let persister = BatchPersister::new(fx.records.clone(), 50);
        let reporter = ProgressReporter::new(fx.sessions.clone(), fx.jobs.clone());
        let client = StopAfterFirst {
            inner: portal,
            sessions: fx.sessions.clone(),
            session_id: fx.session.id.clone(),
        };

        let mut driver = PaginationDriver::new(
            Box::new(client),
            &extractor,
            &persister,
            &reporter,
            &fx.sessions,
            50,
        );
        let summary = driver.run(&fx.session).await.unwrap();

        // Page 1 completed (stop cannot interrupt in-flight extraction);
        // page 2 was never loaded.
        assert!(summary.stopped);
        assert_eq!(summary.pages_processed, 1);
        assert_eq!(summary.records_persisted, 2);
        assert_eq!(loaded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn total_pages_clamped_to_maximum() {
        let fx = fixture();
        let (portal, _) = ScriptedPortal::new(vec![1; 10]);
        let extractor = extractor_for_portal("keystone");
        let persister = BatchPersister::new(fx.records.clone(), 50);
        let reporter = ProgressReporter::new(fx.sessions.clone(), fx.jobs.clone());

        let mut driver = PaginationDriver::new(
            Box::new(portal),
            &extractor,
            &persister,
            &reporter,
            &fx.sessions,
            3,
        );
        let summary = driver.run(&fx.session).await.unwrap();
        assert_eq!(summary.total_pages, 3);
        assert_eq!(summary.records_persisted, 3);
    }
}
