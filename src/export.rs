//! CSV export of a job's policy records.
//!
//! Column order is stable: the seven summary fields, then the nine detail
//! fields, then provenance. Values go out verbatim, exactly as the portal
//! presented them; absent detail fields become empty cells.

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::models::PolicyRecord;
use crate::repository::PolicyRepository;

/// Stable export column order.
pub const CSV_HEADERS: [&str; 18] = [
    "policy_number",
    "applicant_name",
    "plan_name",
    "face_amount",
    "premium",
    "status",
    "updated_date",
    "issue_date",
    "application_date",
    "date_of_birth",
    "gender",
    "age",
    "state",
    "agent_name",
    "agent_number",
    "notes",
    "page_number",
    "scraped_at",
];

fn record_fields(record: &PolicyRecord) -> [String; 18] {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        record.policy_number.clone(),
        record.applicant_name.clone(),
        record.plan_name.clone(),
        record.face_amount.clone(),
        record.premium.clone(),
        record.status.clone(),
        record.updated_date.clone(),
        opt(&record.issue_date),
        opt(&record.application_date),
        opt(&record.date_of_birth),
        opt(&record.gender),
        opt(&record.age),
        opt(&record.state),
        opt(&record.agent_name),
        opt(&record.agent_number),
        opt(&record.notes),
        record.page_number.to_string(),
        record.scraped_at.to_rfc3339(),
    ]
}

/// Write a job's records as CSV to any writer, in persistence order.
pub fn write_csv<W: Write>(records: &[PolicyRecord], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADERS)
        .map_err(|e| crate::error::ScrapeError::Extraction(e.to_string()))?;
    for record in records {
        csv.write_record(record_fields(record))
            .map_err(|e| crate::error::ScrapeError::Extraction(e.to_string()))?;
    }
    csv.flush()
        .map_err(|e| crate::error::ScrapeError::Extraction(e.to_string()))?;
    Ok(())
}

/// Render a job's records as a CSV string.
pub fn to_csv_string(records: &[PolicyRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(records, &mut buf)?;
    // csv writes only UTF-8.
    Ok(String::from_utf8(buf).unwrap_or_default())
}

/// Export all records of a job to a CSV file.
pub fn export_job(records: &PolicyRepository, job_id: &str, output: &Path) -> Result<usize> {
    let rows = records.list_by_job(job_id)?;
    let file = std::fs::File::create(output)
        .map_err(|e| crate::error::ScrapeError::Extraction(format!("cannot create output: {e}")))?;
    write_csv(&rows, file)?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: &str) -> PolicyRecord {
        PolicyRecord::from_summary(
            "job-1",
            2,
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
    fn header_row_and_order_are_stable() {
        let csv = to_csv_string(&[]).unwrap();
        assert_eq!(csv.lines().next().unwrap(), CSV_HEADERS.join(","));
    }

    #[test]
    fn absent_detail_fields_export_as_empty_cells() {
        let mut with_detail = record("0004417");
        with_detail.gender = Some("F".to_string());
        with_detail.age = Some("52".to_string());
        let without_detail = record("0004418");

        let csv = to_csv_string(&[with_detail, without_detail]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(",F,52,"));
        assert!(lines[2].starts_with("0004418,"));
        // Detail columns on the partial row are empty, not literal "null".
        assert!(!lines[2].contains("null"));
    }

    #[test]
    fn export_reparse_round_trips_field_for_field() {
        let mut record = record("0004417");
        record.issue_date = Some("01/02/03".to_string());
        record.gender = Some("F".to_string());
        record.notes = Some("mailed amendment, pending".to_string());

        let csv = to_csv_string(std::slice::from_ref(&record)).unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let row = reader.records().next().unwrap().unwrap();

        // Empty cells map back to None, everything else is verbatim.
        let opt = |i: usize| {
            let v = row.get(i).unwrap();
            (!v.is_empty()).then(|| v.to_string())
        };
        assert_eq!(row.get(0), Some(record.policy_number.as_str()));
        assert_eq!(row.get(1), Some(record.applicant_name.as_str()));
        assert_eq!(row.get(3), Some(record.face_amount.as_str()));
        assert_eq!(opt(7), record.issue_date);
        assert_eq!(opt(8), record.application_date);
        assert_eq!(opt(10), record.gender);
        assert_eq!(opt(15), record.notes);
        assert_eq!(row.get(16), Some("2"));
    }

    #[test]
    fn values_are_not_normalized() {
        let csv = to_csv_string(&[record("0004417")]).unwrap();
        let row = csv.lines().nth(1).unwrap();
        // Currency formatting survives verbatim (quoted for the comma).
        assert!(row.contains("\"$250,000\""));
        assert!(row.starts_with("0004417,"));
    }
}
