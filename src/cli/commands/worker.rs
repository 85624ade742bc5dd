//! Worker command: run the scraping loop until interrupted.

use std::sync::Arc;

use console::style;

use crate::browser::CdpConnector;
use crate::config::Settings;
use crate::worker::Worker;

use super::context;

pub async fn cmd_worker(settings: &Settings) -> anyhow::Result<()> {
    let ctx = context(settings)?;

    let connector = Arc::new(CdpConnector::new(
        ctx.provider.clone(),
        settings.provider.clone(),
        settings.portal.clone(),
    ));

    println!(
        "{} Worker polling every {}s (Ctrl-C to stop)",
        style("→").cyan(),
        settings.worker.poll_interval_secs
    );

    let worker = Worker::new(
        settings.clone(),
        ctx.sessions,
        ctx.jobs,
        ctx.records,
        ctx.service,
        connector,
        ctx.provider,
    );
    worker.run().await?;

    println!("{} Worker stopped", style("✓").green());
    Ok(())
}
