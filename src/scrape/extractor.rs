//! Field extraction from raw portal rows.
//!
//! Detail panels present labeled free-text lines ("Issue Date: 01/02/03").
//! Parsing is anchored-pattern matching isolated behind the
//! `FieldExtractor` trait so a pattern set can be swapped per portal
//! without touching pagination or session logic. A missing panel or label
//! degrades to a partial record; nothing is ever dropped here.

use regex::Regex;
use tracing::debug;

use crate::models::PolicyRecord;

use super::RawPolicyRow;

/// Detail-panel slots a pattern set can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailField {
    IssueDate,
    ApplicationDate,
    DateOfBirth,
    Gender,
    Age,
    State,
    AgentName,
    AgentNumber,
    Notes,
}

/// Pure mapping from a raw row to a policy record. No I/O.
pub trait FieldExtractor: Send + Sync {
    fn portal_id(&self) -> &str;

    /// Always emits a record; detail fields stay `None` on a miss.
    fn extract(&self, job_id: &str, page: u32, raw: &RawPolicyRow) -> PolicyRecord;
}

/// Anchored-regex extractor built from a per-portal label table.
pub struct LabeledFieldExtractor {
    portal_id: String,
    patterns: Vec<(DetailField, Regex)>,
}

/// Label tables per portal. The slot order doubles as extraction order.
const KEYSTONE_LABELS: &[(DetailField, &str)] = &[
    (DetailField::IssueDate, "Issue Date"),
    (DetailField::ApplicationDate, "Application Date"),
    (DetailField::DateOfBirth, "DOB"),
    (DetailField::Gender, "Gender"),
    (DetailField::Age, "Age"),
    (DetailField::State, "State"),
    (DetailField::AgentName, "Agent Name"),
    (DetailField::AgentNumber, "Agent Number"),
    (DetailField::Notes, "Notes"),
];

/// Meridian spells several labels differently; everything else is shared.
const MERIDIAN_LABELS: &[(DetailField, &str)] = &[
    (DetailField::IssueDate, "Issued"),
    (DetailField::ApplicationDate, "App Date"),
    (DetailField::DateOfBirth, "Date of Birth"),
    (DetailField::Gender, "Gender"),
    (DetailField::Age, "Age"),
    (DetailField::State, "Resident State"),
    (DetailField::AgentName, "Writing Agent"),
    (DetailField::AgentNumber, "Agent No"),
    (DetailField::Notes, "Remarks"),
];

/// Pattern-set dispatch keyed by portal identifier. Unknown portals fall
/// back to the keystone label table.
pub fn extractor_for_portal(portal_id: &str) -> LabeledFieldExtractor {
    let labels = match portal_id {
        "meridian" => MERIDIAN_LABELS,
        _ => KEYSTONE_LABELS,
    };
    LabeledFieldExtractor::new(portal_id, labels)
}

impl LabeledFieldExtractor {
    fn new(portal_id: &str, labels: &[(DetailField, &str)]) -> Self {
        let patterns = labels
            .iter()
            .filter_map(|(field, label)| {
                Regex::new(&format!(
                    r"(?mi)^\s*{}\s*:\s*(.+?)\s*$",
                    regex::escape(label)
                ))
                .ok()
                .map(|re| (*field, re))
            })
            .collect();
        Self {
            portal_id: portal_id.to_string(),
            patterns,
        }
    }

    fn capture<'t>(&self, field: DetailField, text: &'t str) -> Option<&'t str> {
        self.patterns
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, re)| re.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

impl FieldExtractor for LabeledFieldExtractor {
    fn portal_id(&self) -> &str {
        &self.portal_id
    }

    fn extract(&self, job_id: &str, page: u32, raw: &RawPolicyRow) -> PolicyRecord {
        let mut record = PolicyRecord::from_summary(
            job_id,
            page,
            raw.policy_number.clone(),
            raw.applicant_name.clone(),
            raw.plan_name.clone(),
            raw.face_amount.clone(),
            raw.premium.clone(),
            raw.status.clone(),
            raw.updated_date.clone(),
        );

        let Some(detail) = raw.detail_text.as_deref() else {
            debug!(
                policy_number = %raw.policy_number,
                "detail panel absent; emitting summary-only record"
            );
            return record;
        };

        for (field, _) in &self.patterns {
            let value = self.capture(*field, detail).map(str::to_string);
            if value.is_none() {
                debug!(
                    policy_number = %raw.policy_number,
                    field = ?field,
                    "labeled field not found in detail panel"
                );
            }
            match field {
                DetailField::IssueDate => record.issue_date = value,
                DetailField::ApplicationDate => record.application_date = value,
                DetailField::DateOfBirth => record.date_of_birth = value,
                DetailField::Gender => record.gender = value,
                DetailField::Age => record.age = value,
                DetailField::State => record.state = value,
                DetailField::AgentName => record.agent_name = value,
                DetailField::AgentNumber => record.agent_number = value,
                DetailField::Notes => record.notes = value,
            }
        }

        record
    }
}
