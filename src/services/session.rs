//! The session state machine.
//!
//! Authoritative lifecycle of one scraping attempt:
//! `initializing → waiting_for_login → ready → scraping → {completed | failed}`.
//! State is persisted on every transition for cross-process visibility;
//! terminal transitions propagate to the owning job.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::browser::{allocate_browser, resolve_endpoint, BrowserProvider};
use crate::config::ProviderSettings;
use crate::error::{Result, ScrapeError};
use crate::models::{Job, Session, SessionStatus};
use crate::repository::{JobRepository, SessionRepository};

pub struct SessionService {
    sessions: SessionRepository,
    jobs: JobRepository,
    provider: Arc<dyn BrowserProvider>,
    /// Allocation profile and retry budget.
    provider_settings: ProviderSettings,
}

impl SessionService {
    pub fn new(
        sessions: SessionRepository,
        jobs: JobRepository,
        provider: Arc<dyn BrowserProvider>,
        provider_settings: ProviderSettings,
    ) -> Self {
        Self {
            sessions,
            jobs,
            provider,
            provider_settings,
        }
    }

    /// Create a job/session pair and request a remote browser allocation.
    /// Allocation is retried within the configured budget before the session
    /// is failed. The session lands in `waiting_for_login` once the browser
    /// is confirmed reachable; the human operator logs in from there.
    pub async fn start(&self, job_name: &str, portal_id: &str) -> Result<Session> {
        let job = Job::new(job_name);
        self.jobs.insert(&job)?;

        let session = Session::new(&job.id, portal_id);
        self.sessions.insert(&session)?;
        info!(session_id = %session.id, job_id = %job.id, "session created");

        let retry_delay = Duration::from_secs(self.provider_settings.retry_delay_secs);
        let allocation_id = match allocate_browser(
            self.provider.as_ref(),
            self.provider_settings.profile.as_deref(),
            self.provider_settings.retry_attempts,
            retry_delay,
        )
        .await
        {
            Ok(id) => id,
            Err(e) => {
                let message = e.to_string();
                self.fail_quietly(&session.id, &job.id, &message);
                return Err(ScrapeError::Provisioning(message));
            }
        };
        self.sessions.set_allocation(&session.id, &allocation_id)?;

        // Confirm the remote browser is reachable before handing the
        // session to the operator.
        match resolve_endpoint(
            self.provider.as_ref(),
            &allocation_id,
            self.provider_settings.retry_attempts,
            retry_delay,
        )
        .await
        {
            Ok(endpoint) => {
                self.sessions
                    .set_connection_endpoint(&session.id, &endpoint)?;
            }
            Err(e) => {
                let message = e.to_string();
                self.fail_quietly(&session.id, &job.id, &message);
                return Err(ScrapeError::Provisioning(message));
            }
        }

        self.mark_waiting_for_login(&session.id)?;
        self.get(&session.id)
    }

    pub fn get(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .get(session_id)?
            .ok_or_else(|| ScrapeError::NotFound(format!("session {session_id}")))
    }

    /// `initializing → waiting_for_login`, once the browser is reachable.
    /// Idempotent on repeat.
    pub fn mark_waiting_for_login(&self, session_id: &str) -> Result<()> {
        if self.sessions.try_transition(
            session_id,
            SessionStatus::Initializing,
            SessionStatus::WaitingForLogin,
        )? {
            return Ok(());
        }
        match self.get(session_id)?.status {
            SessionStatus::WaitingForLogin => Ok(()),
            status => Err(ScrapeError::InvalidTransition {
                from: status,
                to: SessionStatus::WaitingForLogin,
            }),
        }
    }

    /// `waiting_for_login → ready`, driven by explicit human confirmation.
    /// A repeat call on a session already `ready` is a no-op; anything else
    /// is rejected without mutating the record.
    pub fn confirm_ready(&self, session_id: &str) -> Result<Session> {
        if self.sessions.try_transition(
            session_id,
            SessionStatus::WaitingForLogin,
            SessionStatus::Ready,
        )? {
            info!(session_id, "operator confirmed login; session ready");
            return self.get(session_id);
        }

        let session = self.get(session_id)?;
        match session.status {
            SessionStatus::Ready => Ok(session),
            status => Err(ScrapeError::InvalidTransition {
                from: status,
                to: SessionStatus::Ready,
            }),
        }
    }

    /// Claim a `ready` session for scraping. The conditional update means
    /// at most one worker instance wins; losers see `false` and move on.
    pub fn claim_for_scraping(&self, session_id: &str) -> Result<bool> {
        if !self.sessions.claim_ready(session_id)? {
            return Ok(false);
        }
        let session = self.get(session_id)?;
        if let Err(e) = self.jobs.mark_in_progress(&session.job_id) {
            warn!(job_id = %session.job_id, "failed to mark job in progress: {e}");
        }
        Ok(true)
    }

    /// Terminal success; propagates to the owning job.
    pub fn complete(&self, session_id: &str, final_count: u64) -> Result<()> {
        let session = self.get(session_id)?;
        if !self.sessions.mark_completed(session_id, final_count)? {
            return Err(ScrapeError::InvalidTransition {
                from: session.status,
                to: SessionStatus::Completed,
            });
        }
        self.jobs.mark_completed(&session.job_id, final_count)?;
        info!(session_id, final_count, "session completed");
        Ok(())
    }

    /// Terminal failure with a human-readable message; propagates to the
    /// owning job. A no-op when the session is already terminal — a failed
    /// session never converts, and a completed one never regresses.
    pub fn fail(&self, session_id: &str, message: &str) -> Result<()> {
        let session = self.get(session_id)?;
        if self.sessions.mark_failed(session_id, message)? {
            self.jobs.mark_failed(&session.job_id, message)?;
            info!(session_id, message, "session failed");
        }
        Ok(())
    }

    /// Operator stop: a flag honored at the next state check between
    /// operations. Cannot interrupt an in-flight page extraction.
    pub fn request_stop(&self, session_id: &str) -> Result<()> {
        if !self.sessions.request_stop(session_id)? {
            // Either unknown or already terminal; distinguish for the caller.
            let session = self.get(session_id)?;
            info!(session_id, status = %session.status, "stop ignored on terminal session");
        }
        Ok(())
    }

    fn fail_quietly(&self, session_id: &str, job_id: &str, message: &str) {
        if let Err(e) = self.sessions.mark_failed(session_id, message) {
            warn!(session_id, "failed to record session failure: {e}");
        }
        if let Err(e) = self.jobs.mark_failed(job_id, message) {
            warn!(job_id, "failed to record job failure: {e}");
        }
    }
}
