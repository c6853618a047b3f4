//! CLI `export` command — dump the knowledge base as JSON.

use anyhow::Result;
use serde::Serialize;

use crate::config::ChronicleConfig;
use crate::registry::Category;
use crate::store::{self, Citation, CrossReference, Entity};

/// Export format — entities with their citations, plus all links.
#[derive(Debug, Serialize)]
struct ExportData {
    entities: Vec<ExportEntity>,
    cross_references: Vec<CrossReference>,
}

#[derive(Debug, Serialize)]
struct ExportEntity {
    #[serde(flatten)]
    entity: Entity,
    citations: Vec<Citation>,
}

/// Export all active entities, their citations, and cross-references as JSON
/// to stdout. Superseded entities are omitted; their citations live on in
/// their replacements.
pub fn export(config: &ChronicleConfig) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;

    let mut entities = Vec::new();
    let mut cross_references = Vec::new();
    let mut seen_links = std::collections::HashSet::new();

    for category in Category::ALL {
        for entity in store::active_entities(&conn, *category)? {
            let citations = store::entity_citations(&conn, &entity.id)?;
            for xref in store::entity_cross_references(&conn, &entity.id)? {
                if !xref.stale && seen_links.insert(xref.id.clone()) {
                    cross_references.push(xref);
                }
            }
            entities.push(ExportEntity { entity, citations });
        }
    }

    let data = ExportData {
        entities,
        cross_references,
    };
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
