//! CLI `inspect` command — display full details for a single entity.

use anyhow::Result;

use crate::config::ChronicleConfig;
use crate::store;

/// Inspect a single entity by ID: fields, citations, cross-references.
pub fn inspect(config: &ChronicleConfig, id: &str) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;

    let entity = store::get_entity(&conn, id)?
        .ok_or_else(|| anyhow::anyhow!("entity not found: {id}"))?;

    println!("Entity: {}", entity.id);
    println!("{}", "=".repeat(50));
    println!("  Category:       {}", entity.category);
    println!("  Title:          {}", entity.title);
    println!("  Evidence:       {}", entity.evidence_kind);
    if entity.needs_review {
        println!("  Needs review:   yes");
    }
    if let Some(ref sb) = entity.superseded_by {
        println!("  Superseded by:  {sb}");
    }
    println!("  Created:        {}", entity.created_at);
    println!("  Updated:        {}", entity.updated_at);
    if !entity.fields.is_empty() {
        println!("  Fields:         {}", serde_json::to_string_pretty(&entity.fields)?);
    }
    if let Some(ref interpretation) = entity.interpretation {
        println!();
        println!("Interpretation:");
        println!("  {interpretation}");
    }

    let citations = store::entity_citations(&conn, id)?;
    if !citations.is_empty() {
        println!();
        println!("Citations:");
        for c in &citations {
            println!("  [{}] \"{}\"", c.session_id, c.quote);
        }
    }

    let xrefs = store::entity_cross_references(&conn, id)?;
    if !xrefs.is_empty() {
        println!();
        println!("Cross-references:");
        for x in &xrefs {
            let marker = if x.stale {
                " (stale)"
            } else if x.system_inferred {
                " (inferred)"
            } else {
                ""
            };
            println!("  {} --[{}]--> {}{}", x.source_id, x.kind, x.target_id, marker);
        }
    }

    Ok(())
}
