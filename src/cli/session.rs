//! CLI `session` commands — import a transcript file, list sessions.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::config::ChronicleConfig;
use crate::transcript::{self, Speaker};

/// Transcript import format: an ordered list of turns.
#[derive(Debug, Deserialize)]
struct TranscriptFile {
    turns: Vec<TranscriptTurn>,
}

#[derive(Debug, Deserialize)]
struct TranscriptTurn {
    speaker: Speaker,
    text: String,
}

/// Import a transcript JSON file as one completed session, ready for
/// enrichment.
pub fn import(config: &ChronicleConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read transcript file: {}", file.display()))?;
    let data: TranscriptFile =
        serde_json::from_str(&json).context("failed to parse transcript JSON")?;

    anyhow::ensure!(!data.turns.is_empty(), "transcript has no turns");

    let conn = crate::db::open_database(config.resolved_db_path())?;
    let session_id = transcript::create_session(&conn)?;
    for turn in &data.turns {
        transcript::append_turn(&conn, &session_id, turn.speaker, &turn.text)?;
    }
    transcript::complete_session(&conn, &session_id)?;

    println!(
        "Imported session {} ({} turns). Run `chronicle enrich --session {}` to process it.",
        session_id,
        data.turns.len(),
        session_id
    );
    Ok(())
}

/// List all sessions with their status and enrichment state.
pub fn list(config: &ChronicleConfig) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let sessions = transcript::list_sessions(&conn)?;

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<26} {}",
        "ID", "STATUS", "STARTED", "ENRICHED"
    );
    for s in sessions {
        println!(
            "{:<38} {:<10} {:<26} {}",
            s.id,
            s.status.as_str(),
            s.started_at,
            s.enriched_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
