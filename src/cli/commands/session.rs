//! Session lifecycle commands: start, confirm-ready, status, stop.

use console::style;

use crate::config::Settings;
use crate::models::Session;

use super::context;

/// Create a job/session pair and allocate a remote browser. Prints the
/// connection endpoint so the operator can open the browser and log in.
pub async fn cmd_start(settings: &Settings, name: &str, portal: Option<&str>) -> anyhow::Result<()> {
    let ctx = context(settings)?;
    let portal_id = portal.unwrap_or(&settings.portal.id);

    println!(
        "{} Starting session for job '{}' against portal '{}'",
        style("→").cyan(),
        name,
        portal_id
    );

    let session = ctx.service.start(name, portal_id).await?;

    println!(
        "{} Session {} is waiting for login",
        style("✓").green(),
        session.id
    );
    if let Some(endpoint) = &session.connection_endpoint {
        println!("  Browser endpoint: {}", endpoint);
    }
    println!("  Log in to the portal in the remote browser, then run:");
    println!("    pola confirm-ready {}", session.id);

    Ok(())
}

/// Attest that login is complete and the results table is visible.
pub fn cmd_confirm_ready(settings: &Settings, session_id: &str) -> anyhow::Result<()> {
    let ctx = context(settings)?;
    let session = ctx.service.confirm_ready(session_id)?;

    println!(
        "{} Session {} is ready; the worker will pick it up",
        style("✓").green(),
        session.id
    );
    Ok(())
}

/// Show session and owning-job status.
pub fn cmd_status(settings: &Settings, session_id: &str) -> anyhow::Result<()> {
    let ctx = context(settings)?;
    let session = ctx.service.get(session_id)?;

    print_session(&session);

    if let Some(job) = ctx.jobs.get(&session.job_id)? {
        println!();
        println!("{}", style(format!("Job: {}", job.name)).bold());
        println!("{}", "-".repeat(40));
        println!("{:<20} {}", "Status:", job.status);
        println!("{:<20} {}%", "Progress:", job.progress);
        println!("{:<20} {}", "Scraped Records:", job.scraped_records);
        if let Some(message) = &job.error_message {
            println!("{:<20} {}", "Error:", style(message).red());
        }
        if let Some(completed) = job.completed_at {
            println!(
                "{:<20} {}",
                "Completed:",
                completed.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

/// Request an operator stop; honored between pages.
pub fn cmd_stop(settings: &Settings, session_id: &str) -> anyhow::Result<()> {
    let ctx = context(settings)?;
    ctx.service.request_stop(session_id)?;
    let session = ctx.service.get(session_id)?;

    if session.status.is_terminal() {
        println!(
            "{} Session {} is already {}",
            style("!").yellow(),
            session_id,
            session.status
        );
    } else {
        println!(
            "{} Stop requested; the session halts before its next page",
            style("✓").green()
        );
    }
    Ok(())
}

fn print_session(session: &Session) {
    println!("\n{}", style(format!("Session {}", session.id)).bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Status:", session.status);
    println!("{:<20} {}", "Portal:", session.portal_id);
    if session.total_pages > 0 {
        println!(
            "{:<20} {}/{}",
            "Pages:", session.current_page, session.total_pages
        );
    }
    println!("{:<20} {}", "Records:", session.scraped_count);
    if session.stop_requested && !session.status.is_terminal() {
        println!("{:<20} {}", "Stop:", style("requested").yellow());
    }
    if let Some(message) = &session.error_message {
        println!("{:<20} {}", "Error:", style(message).red());
    }
}
