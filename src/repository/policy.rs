//! Policy record repository: append-only batched writes.
//!
//! Records are created only by the batch persister and never mutated
//! afterward; each scraping run produces an immutable append-only batch.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, Row};

use super::{parse_datetime, Result};
use crate::models::PolicyRecord;

/// SQLite-backed repository for extracted policy records.
#[derive(Clone)]
pub struct PolicyRepository {
    db_path: PathBuf,
}

impl PolicyRepository {
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
            CREATE TABLE IF NOT EXISTS policy_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,

                -- Summary row (always populated, opaque strings)
                policy_number TEXT NOT NULL,
                applicant_name TEXT NOT NULL DEFAULT '',
                plan_name TEXT NOT NULL DEFAULT '',
                face_amount TEXT NOT NULL DEFAULT '',
                premium TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                updated_date TEXT NOT NULL DEFAULT '',

                -- Detail panel (absent panel leaves these NULL)
                issue_date TEXT,
                application_date TEXT,
                date_of_birth TEXT,
                gender TEXT,
                age TEXT,
                state TEXT,
                agent_name TEXT,
                agent_number TEXT,
                notes TEXT,

                -- Provenance
                page_number INTEGER NOT NULL DEFAULT 0,
                scraped_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_policy_records_job
                ON policy_records(job_id);
            CREATE INDEX IF NOT EXISTS idx_policy_records_number
                ON policy_records(job_id, policy_number);
        "#,
        )?;
        Ok(())
    }

    /// Insert one batch inside a single transaction. A failed batch leaves
    /// no partial rows behind; batches already committed stay durable.
    pub fn insert_batch(&self, records: &[PolicyRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO policy_records (
                    job_id, policy_number, applicant_name, plan_name,
                    face_amount, premium, status, updated_date,
                    issue_date, application_date, date_of_birth, gender, age,
                    state, agent_name, agent_number, notes,
                    page_number, scraped_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                          ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                "#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.job_id,
                    record.policy_number,
                    record.applicant_name,
                    record.plan_name,
                    record.face_amount,
                    record.premium,
                    record.status,
                    record.updated_date,
                    record.issue_date,
                    record.application_date,
                    record.date_of_birth,
                    record.gender,
                    record.age,
                    record.state,
                    record.agent_name,
                    record.agent_number,
                    record.notes,
                    record.page_number as i64,
                    record.scraped_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn count_by_job(&self, job_id: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM policy_records WHERE job_id = ?",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// All records for a job in insertion order (page order, then DOM order
    /// within a page).
    pub fn list_by_job(&self, job_id: &str) -> Result<Vec<PolicyRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM policy_records WHERE job_id = ? ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map(params![job_id], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<PolicyRecord> {
    Ok(PolicyRecord {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        policy_number: row.get("policy_number")?,
        applicant_name: row.get("applicant_name")?,
        plan_name: row.get("plan_name")?,
        face_amount: row.get("face_amount")?,
        premium: row.get("premium")?,
        status: row.get("status")?,
        updated_date: row.get("updated_date")?,
        issue_date: row.get("issue_date")?,
        application_date: row.get("application_date")?,
        date_of_birth: row.get("date_of_birth")?,
        gender: row.get("gender")?,
        age: row.get("age")?,
        state: row.get("state")?,
        agent_name: row.get("agent_name")?,
        agent_number: row.get("agent_number")?,
        notes: row.get("notes")?,
        page_number: row.get::<_, i64>("page_number")? as u32,
        scraped_at: parse_datetime(&row.get::<_, String>("scraped_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_repo() -> (PolicyRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = PolicyRepository::new(&dir.path().join("test.db")).unwrap();
        (repo, dir)
    }

    fn record(job_id: &str, number: &str) -> PolicyRecord {
        PolicyRecord::from_summary(
            job_id,
            1,
            number,
            "Dana Whitfield",
            "Term 20",
            "$250,000",
            "$31.10",
            "Active",
            "07/14/2026",
        )
    }

    #[test]
    fn batch_insert_preserves_order_and_count() {
        let (repo, _dir) = test_repo();
        let records = vec![
            record("job-1", "0004417"),
            record("job-1", "0004418"),
            record("job-1", "0004419"),
        ];
        repo.insert_batch(&records).unwrap();

        assert_eq!(repo.count_by_job("job-1").unwrap(), 3);
        let loaded = repo.list_by_job("job-1").unwrap();
        let numbers: Vec<_> = loaded.iter().map(|r| r.policy_number.as_str()).collect();
        assert_eq!(numbers, vec!["0004417", "0004418", "0004419"]);
    }

    #[test]
    fn leading_zeros_survive_verbatim() {
        let (repo, _dir) = test_repo();
        repo.insert_batch(&[record("job-1", "000012345")]).unwrap();
        let loaded = repo.list_by_job("job-1").unwrap();
        assert_eq!(loaded[0].policy_number, "000012345");
    }

    #[test]
    fn detail_fields_round_trip_as_null() {
        let (repo, _dir) = test_repo();
        let mut with_detail = record("job-1", "A100");
        with_detail.issue_date = Some("01/02/03".to_string());
        with_detail.state = Some("NE".to_string());
        let without_detail = record("job-1", "A101");

        repo.insert_batch(&[with_detail, without_detail]).unwrap();
        let loaded = repo.list_by_job("job-1").unwrap();

        assert_eq!(loaded[0].issue_date.as_deref(), Some("01/02/03"));
        assert_eq!(loaded[1].issue_date, None);
        // Partial record is present, not dropped.
        assert_eq!(loaded[1].policy_number, "A101");
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (repo, _dir) = test_repo();
        repo.insert_batch(&[]).unwrap();
        assert_eq!(repo.count_by_job("job-1").unwrap(), 0);
    }
}
