//! Job repository: the durable unit a consumer polls for status/results.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_datetime, parse_datetime_opt, Result};
use crate::models::{Job, JobStatus};

/// SQLite-backed repository for scraping jobs.
#[derive(Clone)]
pub struct JobRepository {
    db_path: PathBuf,
}

impl JobRepository {
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
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                scraped_records INTEGER NOT NULL DEFAULT 0,
                total_records INTEGER NOT NULL DEFAULT 0,
                progress INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status
                ON jobs(status, created_at);
        "#,
        )?;
        Ok(())
    }

    pub fn insert(&self, job: &Job) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO jobs (
                id, name, status, scraped_records, total_records, progress,
                error_message, created_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                job.id,
                job.name,
                job.status.as_str(),
                job.scraped_records as i64,
                job.total_records as i64,
                job.progress as i64,
                job.error_message,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
                job.completed_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.connect()?;
        let job = conn
            .query_row("SELECT * FROM jobs WHERE id = ?", params![id], row_to_job)
            .optional()?;
        Ok(job)
    }

    pub fn mark_in_progress(&self, id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            UPDATE jobs SET status = 'in_progress', updated_at = ?1
            WHERE id = ?2 AND status = 'pending'
            "#,
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Page-derived progress percentage. Fire-and-forget caller semantics.
    pub fn set_progress(&self, id: &str, progress: u8) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE jobs SET progress = ?1, updated_at = ?2 WHERE id = ?3",
            params![progress.min(100) as i64, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn set_scraped_records(&self, id: &str, count: u64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE jobs SET scraped_records = ?1, updated_at = ?2 WHERE id = ?3",
            params![count as i64, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn mark_completed(&self, id: &str, total_records: u64) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            UPDATE jobs
            SET status = 'completed', scraped_records = ?1, total_records = ?1,
                progress = 100, updated_at = ?2, completed_at = ?2
            WHERE id = ?3 AND status NOT IN ('completed', 'failed')
            "#,
            params![total_records as i64, now, id],
        )?;
        Ok(())
    }

    pub fn mark_failed(&self, id: &str, message: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            UPDATE jobs SET status = 'failed', error_message = ?1, updated_at = ?2
            WHERE id = ?3 AND status NOT IN ('completed', 'failed')
            "#,
            params![message, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }
}

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    let status_str: String = row.get("status")?;
    let status = JobStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown job status: {status_str}").into(),
        )
    })?;

    Ok(Job {
        id: row.get("id")?,
        name: row.get("name")?,
        status,
        scraped_records: row.get::<_, i64>("scraped_records")? as u64,
        total_records: row.get::<_, i64>("total_records")? as u64,
        progress: row.get::<_, i64>("progress")? as u8,
        error_message: row.get("error_message")?,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
        completed_at: parse_datetime_opt(row.get("completed_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_repo() -> (JobRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = JobRepository::new(&dir.path().join("test.db")).unwrap();
        (repo, dir)
    }

    #[test]
    fn lifecycle_updates() {
        let (repo, _dir) = test_repo();
        let job = Job::new("June renewals");
        repo.insert(&job).unwrap();

        repo.mark_in_progress(&job.id).unwrap();
        repo.set_progress(&job.id, 40).unwrap();
        repo.set_scraped_records(&job.id, 12).unwrap();

        let loaded = repo.get(&job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::InProgress);
        assert_eq!(loaded.progress, 40);
        assert_eq!(loaded.scraped_records, 12);

        repo.mark_completed(&job.id, 30).unwrap();
        let done = repo.get(&job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.total_records, 30);
        assert!(done.completed_at.is_some());

        // Terminal jobs never regress.
        repo.mark_failed(&job.id, "late failure").unwrap();
        let still_done = repo.get(&job.id).unwrap().unwrap();
        assert_eq!(still_done.status, JobStatus::Completed);
    }

    #[test]
    fn progress_is_clamped() {
        let (repo, _dir) = test_repo();
        let job = Job::new("clamp");
        repo.insert(&job).unwrap();
        repo.set_progress(&job.id, 250).unwrap();
        assert_eq!(repo.get(&job.id).unwrap().unwrap().progress, 100);
    }
}
