use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chronicle::{cli, config};

#[derive(Parser)]
#[command(name = "chronicle", version, about = "Biographical knowledge base built from interview transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage interview sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Run the extraction pipeline over completed sessions
    Enrich {
        /// Enrich one session by ID
        #[arg(long, conflicts_with = "all_pending")]
        session: Option<String>,
        /// Enrich every completed-but-unenriched session, oldest first
        #[arg(long)]
        all_pending: bool,
    },
    /// Show knowledge base statistics
    Stats,
    /// Show full details for one entity
    Inspect {
        /// Entity ID
        id: String,
    },
    /// Export the knowledge base as JSON to stdout
    Export,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Import a transcript JSON file as a completed session
    Import {
        /// Path to the transcript file
        file: PathBuf,
    },
    /// List all sessions
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::ChronicleConfig::load()?;

    let filter =
        EnvFilter::try_new(&config.app.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Session { action } => match action {
            SessionAction::Import { file } => cli::session::import(&config, &file)?,
            SessionAction::List => cli::session::list(&config)?,
        },
        Command::Enrich {
            session,
            all_pending,
        } => match session {
            Some(id) => cli::enrich::session(&config, &id).await?,
            None if all_pending => cli::enrich::all_pending(&config).await?,
            None => anyhow::bail!("pass --session <ID> or --all-pending"),
        },
        Command::Stats => cli::stats::stats(&config)?,
        Command::Inspect { id } => cli::inspect::inspect(&config, &id)?,
        Command::Export => cli::export::export(&config)?,
    }

    Ok(())
}
