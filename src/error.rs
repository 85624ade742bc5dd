//! Error taxonomy for the scraping pipeline.
//!
//! Per-record extraction problems are never surfaced here: a missing detail
//! panel or labeled field degrades to a partial record and is only logged.
//! Everything in this enum is either recovered locally (`InvalidTransition`)
//! or fatal to the session that raised it.

use crate::models::SessionStatus;
use crate::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Remote browser could not be allocated. Fatal to the session; carries
    /// the last underlying provider error for the operator.
    #[error("browser provisioning failed: {0}")]
    Provisioning(String),

    /// A state-machine transition was requested that is not valid from the
    /// current state. Recovered locally; never corrupts the record.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Remote-debugging endpoint unavailable after the retry budget, or the
    /// CDP connection itself failed. Fatal to the session.
    #[error("browser connection failed: {0}")]
    Connection(String),

    /// Navigation succeeded but neither the data marker nor the login
    /// marker appeared within the timeout. Fatal to the session.
    #[error("portal unreachable: {0}")]
    PortalUnreachable(String),

    /// A batch write failed. Fatal from that point forward; batches already
    /// written remain durable.
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    /// In-page evaluation failed at the page level (not a single field).
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("{0} not found")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
