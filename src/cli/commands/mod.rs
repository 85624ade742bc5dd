//! CLI command implementations.

mod export;
mod init;
mod serve;
mod session;
mod worker;

pub use export::cmd_export;
pub use init::cmd_init;
pub use serve::cmd_serve;
pub use session::{cmd_confirm_ready, cmd_start, cmd_status, cmd_stop};
pub use worker::cmd_worker;

use std::sync::Arc;

use crate::browser::HttpBrowserProvider;
use crate::config::Settings;
use crate::repository::{JobRepository, PolicyRepository, SessionRepository};
use crate::services::SessionService;

/// Repositories and the session service, wired from settings.
pub(crate) struct Context {
    pub sessions: SessionRepository,
    pub jobs: JobRepository,
    pub records: PolicyRepository,
    pub provider: Arc<HttpBrowserProvider>,
    pub service: SessionService,
}

pub(crate) fn context(settings: &Settings) -> anyhow::Result<Context> {
    let sessions = SessionRepository::new(&settings.database_path)?;
    let jobs = JobRepository::new(&settings.database_path)?;
    let records = PolicyRepository::new(&settings.database_path)?;
    let provider = Arc::new(HttpBrowserProvider::new(settings.provider.api_url.clone()));
    let service = SessionService::new(
        sessions.clone(),
        jobs.clone(),
        provider.clone(),
        settings.provider.clone(),
    );
    Ok(Context {
        sessions,
        jobs,
        records,
        provider,
        service,
    })
}
