//! Initialize command.

use std::path::Path;

use console::style;

use crate::config::{Settings, CONFIG_FILE};
use crate::repository::{JobRepository, PolicyRepository, SessionRepository};

/// Write a default config file (when missing) and initialize the database.
pub fn cmd_init(settings: &Settings, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = config_path.unwrap_or_else(|| Path::new(CONFIG_FILE));
    if config_path.exists() {
        println!(
            "{} Config already exists at {}",
            style("!").yellow(),
            config_path.display()
        );
    } else {
        settings.save(config_path)?;
        println!(
            "  {} Wrote default config to {}",
            style("✓").green(),
            config_path.display()
        );
    }

    // Repository construction creates the schema.
    let _sessions = SessionRepository::new(&settings.database_path)?;
    let _jobs = JobRepository::new(&settings.database_path)?;
    let _records = PolicyRepository::new(&settings.database_path)?;

    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        settings.database_path.display()
    );

    Ok(())
}
