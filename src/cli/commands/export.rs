//! Export command: write a job's records to CSV.

use std::path::{Path, PathBuf};

use console::style;

use crate::config::Settings;
use crate::export;

use super::context;

pub fn cmd_export(settings: &Settings, job_id: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let ctx = context(settings)?;

    let job = ctx
        .jobs
        .get(job_id)?
        .ok_or_else(|| anyhow::anyhow!("job '{}' not found", job_id))?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{job_id}.csv")));

    let count = export::export_job(&ctx.records, job_id, &output)?;

    println!(
        "{} Exported {} records from '{}' to {}",
        style("✓").green(),
        count,
        job.name,
        output.display()
    );
    Ok(())
}
