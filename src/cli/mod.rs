//! Command-line interface.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "pola")]
#[command(about = "Human-assisted carrier portal acquisition")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to polacquire.toml in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and initialize the database
    Init,

    /// Start a new scraping session (allocates a remote browser)
    Start {
        /// Job name, e.g. "June book of business"
        name: String,
        /// Portal id (defaults to the configured portal)
        #[arg(short, long)]
        portal: Option<String>,
    },

    /// Attest that login is complete and results are visible
    ConfirmReady {
        /// Session ID
        session_id: String,
    },

    /// Show session and job status
    Status {
        /// Session ID (omit to list recent sessions)
        session_id: String,
    },

    /// Request a stop; honored between pages
    Stop {
        /// Session ID
        session_id: String,
    },

    /// Run the scraping worker loop
    Worker,

    /// Start the control API server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (defaults to the
        /// configured bind address)
        bind: Option<String>,
    },

    /// Export a job's records as CSV
    Export {
        /// Job ID
        job_id: String,
        /// Output file (defaults to <job_id>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&settings, cli.config.as_deref()),
        Commands::Start { name, portal } => {
            commands::cmd_start(&settings, &name, portal.as_deref()).await
        }
        Commands::ConfirmReady { session_id } => commands::cmd_confirm_ready(&settings, &session_id),
        Commands::Status { session_id } => commands::cmd_status(&settings, &session_id),
        Commands::Stop { session_id } => commands::cmd_stop(&settings, &session_id),
        Commands::Worker => commands::cmd_worker(&settings).await,
        Commands::Serve { bind } => commands::cmd_serve(&settings, bind.as_deref()).await,
        Commands::Export { job_id, output } => {
            commands::cmd_export(&settings, &job_id, output.as_deref())
        }
    }
}
