//! CLI `enrich` command — run the extraction pipeline over sessions.

use anyhow::{Context, Result};

use crate::config::ChronicleConfig;
use crate::enrich::{self, EnrichmentReport};
use crate::extract::HttpReasoningClient;
use crate::index::NullIndexSink;

/// Enrich one session by ID.
pub async fn session(config: &ChronicleConfig, session_id: &str) -> Result<()> {
    let mut conn = crate::db::open_database(config.resolved_db_path())?;
    let client = HttpReasoningClient::from_config(config)?;

    let report = enrich::enrich_session(&mut conn, &client, config, &NullIndexSink, session_id)
        .await
        .context("enrichment failed")?;
    print_report(&report);
    Ok(())
}

/// Enrich every completed-but-unenriched session, oldest first.
pub async fn all_pending(config: &ChronicleConfig) -> Result<()> {
    let mut conn = crate::db::open_database(config.resolved_db_path())?;
    let client = HttpReasoningClient::from_config(config)?;

    let reports = enrich::enrich_pending(&mut conn, &client, config, &NullIndexSink)
        .await
        .context("enrichment failed")?;
    if reports.is_empty() {
        println!("No pending sessions.");
        return Ok(());
    }
    for report in &reports {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &EnrichmentReport) {
    if report.skipped {
        println!("Session {}: already enriched, skipped", report.session_id);
        return;
    }
    println!("Session {}", report.session_id);
    println!("  Entities created:    {}", report.entities_created);
    println!("  Entities augmented:  {}", report.entities_augmented);
    println!("  Entities superseded: {}", report.entities_superseded);
    println!("  Citations added:     {}", report.citations_added);
    println!("  Links created:       {}", report.links_created);
    println!("  Candidates rejected: {}", report.candidates_rejected);
}
