//! Policy record model: one extracted row of carrier data.
//!
//! All field values are opaque strings exactly as the portal presents them.
//! The extractor performs no currency or date parsing and no normalization;
//! carrier-assigned policy numbers keep their leading zeros verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One extracted policy row. Summary-row fields are always present (possibly
/// empty strings); detail-panel fields are `None` when the panel or the
/// labeled field was absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Database row id; 0 before insert.
    #[serde(default)]
    pub id: i64,
    pub job_id: String,

    // Summary row fields.
    pub policy_number: String,
    pub applicant_name: String,
    pub plan_name: String,
    pub face_amount: String,
    pub premium: String,
    pub status: String,
    pub updated_date: String,

    // Detail panel fields.
    pub issue_date: Option<String>,
    pub application_date: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub state: Option<String>,
    pub agent_name: Option<String>,
    pub agent_number: Option<String>,
    pub notes: Option<String>,

    // Provenance.
    pub page_number: u32,
    pub scraped_at: DateTime<Utc>,
}

impl PolicyRecord {
    /// Build a record carrying only summary-row fields; detail fields start
    /// empty and are filled in by the field extractor when a detail panel
    /// is present.
    #[allow(clippy::too_many_arguments)]
    pub fn from_summary(
        job_id: impl Into<String>,
        page_number: u32,
        policy_number: impl Into<String>,
        applicant_name: impl Into<String>,
        plan_name: impl Into<String>,
        face_amount: impl Into<String>,
        premium: impl Into<String>,
        status: impl Into<String>,
        updated_date: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            job_id: job_id.into(),
            policy_number: policy_number.into(),
            applicant_name: applicant_name.into(),
            plan_name: plan_name.into(),
            face_amount: face_amount.into(),
            premium: premium.into(),
            status: status.into(),
            updated_date: updated_date.into(),
            issue_date: None,
            application_date: None,
            date_of_birth: None,
            gender: None,
            age: None,
            state: None,
            agent_name: None,
            agent_number: None,
            notes: None,
            page_number,
            scraped_at: Utc::now(),
        }
    }
}
