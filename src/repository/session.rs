//! Session repository: lifecycle persistence and the scraping claim.
//!
//! The session row is the single shared mutable resource between the control
//! API and the worker loop. Claiming is a conditional update checking the
//! affected-row count, so at most one worker wins a `ready` session.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_datetime, Result};
use crate::models::{Session, SessionStatus};

/// SQLite-backed repository for scraping sessions.
#[derive(Clone)]
pub struct SessionRepository {
    db_path: PathBuf,
}

impl SessionRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                portal_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'initializing',

                -- Remote browser allocation
                allocation_id TEXT,
                connection_endpoint TEXT,

                -- Progress counters
                current_page INTEGER NOT NULL DEFAULT 0,
                total_pages INTEGER NOT NULL DEFAULT 0,
                scraped_count INTEGER NOT NULL DEFAULT 0,

                -- Operator stop flag, honored at the next state check
                stop_requested INTEGER NOT NULL DEFAULT 0,

                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_status
                ON sessions(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_job
                ON sessions(job_id);
        "#,
        )?;
        Ok(())
    }

    pub fn insert(&self, session: &Session) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO sessions (
                id, job_id, portal_id, status, allocation_id,
                connection_endpoint, current_page, total_pages, scraped_count,
                stop_requested, error_message, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                session.id,
                session.job_id,
                session.portal_id,
                session.status.as_str(),
                session.allocation_id,
                session.connection_endpoint,
                session.current_page as i64,
                session.total_pages as i64,
                session.scraped_count as i64,
                session.stop_requested as i64,
                session.error_message,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.connect()?;
        let session = conn
            .query_row(
                "SELECT * FROM sessions WHERE id = ?",
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Oldest session currently in `ready`, if any.
    pub fn oldest_ready(&self) -> Result<Option<Session>> {
        let conn = self.connect()?;
        let session = conn
            .query_row(
                r#"
                SELECT * FROM sessions
                WHERE status = 'ready'
                ORDER BY created_at ASC
                LIMIT 1
                "#,
                [],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Conditional transition: updates the row only when its status still
    /// equals `from`. Returns whether a row was changed.
    pub fn try_transition(&self, id: &str, from: SessionStatus, to: SessionStatus) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_str(), Utc::now().to_rfc3339(), id, from.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Claim a `ready` session for scraping. At most one caller wins.
    pub fn claim_ready(&self, id: &str) -> Result<bool> {
        self.try_transition(id, SessionStatus::Ready, SessionStatus::Scraping)
    }

    pub fn set_allocation(&self, id: &str, allocation_id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE sessions SET allocation_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![allocation_id, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn set_connection_endpoint(&self, id: &str, endpoint: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE sessions SET connection_endpoint = ?1, updated_at = ?2 WHERE id = ?3",
            params![endpoint, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn set_page_progress(&self, id: &str, current_page: u32, total_pages: u32) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            UPDATE sessions
            SET current_page = ?1, total_pages = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
            params![
                current_page as i64,
                total_pages as i64,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn set_scraped_count(&self, id: &str, count: u64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE sessions SET scraped_count = ?1, updated_at = ?2 WHERE id = ?3",
            params![count as i64, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Set the stop flag. Returns false when the session does not exist or
    /// is already terminal.
    pub fn request_stop(&self, id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            UPDATE sessions SET stop_requested = 1, updated_at = ?1
            WHERE id = ?2 AND status NOT IN ('completed', 'failed')
            "#,
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn stop_requested(&self, id: &str) -> Result<bool> {
        let conn = self.connect()?;
        let flag: Option<i64> = conn
            .query_row(
                "SELECT stop_requested FROM sessions WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(0) != 0)
    }

    /// Terminal failure; guarded so completed sessions never convert.
    pub fn mark_failed(&self, id: &str, message: &str) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            UPDATE sessions SET status = 'failed', error_message = ?1, updated_at = ?2
            WHERE id = ?3 AND status NOT IN ('completed', 'failed')
            "#,
            params![message, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_completed(&self, id: &str, final_count: u64) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            UPDATE sessions SET status = 'completed', scraped_count = ?1, updated_at = ?2
            WHERE id = ?3 AND status = 'scraping'
            "#,
            params![final_count as i64, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed > 0)
    }
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let status_str: String = row.get("status")?;
    let status = SessionStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown session status: {status_str}").into(),
        )
    })?;

    Ok(Session {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        portal_id: row.get("portal_id")?,
        status,
        allocation_id: row.get("allocation_id")?,
        connection_endpoint: row.get("connection_endpoint")?,
        current_page: row.get::<_, i64>("current_page")? as u32,
        total_pages: row.get::<_, i64>("total_pages")? as u32,
        scraped_count: row.get::<_, i64>("scraped_count")? as u64,
        stop_requested: row.get::<_, i64>("stop_requested")? != 0,
        error_message: row.get("error_message")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_repo() -> (SessionRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SessionRepository::new(&dir.path().join("test.db")).unwrap();
        (repo, dir)
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (repo, _dir) = test_repo();
        let session = Session::new("job-1", "keystone");
        repo.insert(&session).unwrap();

        let loaded = repo.get(&session.id).unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.job_id, "job-1");
        assert_eq!(loaded.status, SessionStatus::Initializing);
        assert!(!loaded.stop_requested);
    }

    #[test]
    fn claim_is_won_exactly_once() {
        let (repo, _dir) = test_repo();
        let mut session = Session::new("job-1", "keystone");
        session.status = SessionStatus::Ready;
        repo.insert(&session).unwrap();

        assert!(repo.claim_ready(&session.id).unwrap());
        // A second claimant observes the row already in `scraping`.
        assert!(!repo.claim_ready(&session.id).unwrap());

        let loaded = repo.get(&session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Scraping);
    }

    #[test]
    fn oldest_ready_skips_other_statuses() {
        let (repo, _dir) = test_repo();

        let mut first = Session::new("job-1", "keystone");
        first.status = SessionStatus::Ready;
        first.created_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        repo.insert(&first).unwrap();

        let mut second = Session::new("job-2", "keystone");
        second.status = SessionStatus::Ready;
        repo.insert(&second).unwrap();

        let waiting = Session::new("job-3", "keystone");
        repo.insert(&waiting).unwrap();

        let oldest = repo.oldest_ready().unwrap().unwrap();
        assert_eq!(oldest.id, first.id);
    }

    #[test]
    fn completed_sessions_never_convert_to_failed() {
        let (repo, _dir) = test_repo();
        let mut session = Session::new("job-1", "keystone");
        session.status = SessionStatus::Scraping;
        repo.insert(&session).unwrap();

        assert!(repo.mark_completed(&session.id, 42).unwrap());
        assert!(!repo.mark_failed(&session.id, "too late").unwrap());

        let loaded = repo.get(&session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Completed);
        assert_eq!(loaded.scraped_count, 42);
        assert!(loaded.error_message.is_none());
    }

    #[test]
    fn stop_flag_only_applies_to_live_sessions() {
        let (repo, _dir) = test_repo();
        let mut session = Session::new("job-1", "keystone");
        session.status = SessionStatus::Scraping;
        repo.insert(&session).unwrap();

        assert!(repo.request_stop(&session.id).unwrap());
        assert!(repo.stop_requested(&session.id).unwrap());

        repo.mark_failed(&session.id, "stopped by operator").unwrap();
        assert!(!repo.request_stop(&session.id).unwrap());
    }
}
