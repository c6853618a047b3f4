//! Entity store — persistence for entities, citations, and cross-references.
//!
//! All mutation functions take a plain [`Connection`] so the enrichment
//! coordinator can run them inside one transaction (a [`rusqlite::Transaction`]
//! derefs to `Connection`). Nothing outside the coordinator's commit path
//! writes to these tables; superseded entities are retained, never deleted.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::{Category, EvidenceKind, Pass};

/// A structured, cited record in one of the fixed categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub category: Category,
    /// Brief, specific title; also the first merge key.
    pub title: String,
    /// Category-specific fields.
    pub fields: Map<String, Value>,
    pub evidence_kind: EvidenceKind,
    /// Analytical "what this reveals" layer, stored apart from the factual
    /// citation and never merged into it.
    pub interpretation: Option<String>,
    /// Set when the merge score fell just short of the merge threshold.
    pub needs_review: bool,
    /// If this entity was replaced, the ID of the replacement.
    pub superseded_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A verified source citation: (session, turn, verbatim quote).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub session_id: String,
    pub turn_id: String,
    pub quote: String,
}

/// A typed directed link between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossReference {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Relation kind, e.g. `"caused_by"`, `"contradicts"`, `"related_to"`.
    pub kind: String,
    /// Present when the transcript itself asserted the link.
    pub citation: Option<Citation>,
    /// `true` when the link was derived by the system rather than stated by
    /// the subject. Always `true` when `citation` is `None`.
    pub system_inferred: bool,
    /// Set instead of re-pointing when supersession would duplicate a link.
    pub stale: bool,
    pub created_at: String,
}

/// Insert a new entity row. Citations are added separately.
pub fn insert_entity(conn: &Connection, entity: &Entity) -> Result<()> {
    conn.execute(
        "INSERT INTO entities (id, category, title, fields, evidence_kind, \
         interpretation, needs_review, superseded_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entity.id,
            entity.category.as_str(),
            entity.title,
            serde_json::to_string(&entity.fields)?,
            entity.evidence_kind.as_str(),
            entity.interpretation,
            entity.needs_review,
            entity.superseded_by,
            entity.created_at,
            entity.updated_at,
        ],
    )?;
    Ok(())
}

/// Add a citation to an entity. Duplicate (turn, quote) pairs are ignored,
/// which is what makes citation merging a union.
pub fn add_citation(conn: &Connection, entity_id: &str, citation: &Citation) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO citations (entity_id, session_id, turn_id, quote) \
         VALUES (?1, ?2, ?3, ?4)",
        params![entity_id, citation.session_id, citation.turn_id, citation.quote],
    )?;
    Ok(())
}

/// Replace an entity's fields and bump its updated_at.
pub fn update_entity_fields(
    conn: &Connection,
    entity_id: &str,
    fields: &Map<String, Value>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE entities SET fields = ?1, updated_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(fields)?, now, entity_id],
    )?;
    if rows == 0 {
        bail!("entity not found: {entity_id}");
    }
    Ok(())
}

/// Mark an old entity as superseded and re-point its cross-references at the
/// replacement. Links that would collide with an existing link are marked
/// stale instead.
pub fn supersede_entity(conn: &Connection, old_id: &str, new_id: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE entities SET superseded_by = ?1, updated_at = ?2 WHERE id = ?3",
        params![new_id, now, old_id],
    )?;
    if rows == 0 {
        bail!("supersedes target not found: {old_id}");
    }

    repoint_links(conn, old_id, new_id, "source_id")?;
    repoint_links(conn, old_id, new_id, "target_id")?;
    Ok(())
}

fn repoint_links(conn: &Connection, old_id: &str, new_id: &str, column: &str) -> Result<()> {
    let other = if column == "source_id" { "target_id" } else { "source_id" };

    // Stale out links whose re-pointed form already exists, then re-point the rest.
    conn.execute(
        &format!(
            "UPDATE cross_references SET stale = 1 WHERE {column} = ?1 AND EXISTS (\
               SELECT 1 FROM cross_references x \
               WHERE x.{column} = ?2 \
                 AND x.{other} = cross_references.{other} \
                 AND x.kind = cross_references.kind)"
        ),
        params![old_id, new_id],
    )?;
    conn.execute(
        &format!("UPDATE cross_references SET {column} = ?1 WHERE {column} = ?2 AND stale = 0"),
        params![new_id, old_id],
    )?;
    Ok(())
}

/// Insert a cross-reference. Both endpoints must exist. Returns `false` if the
/// (source, target, kind) link already existed.
pub fn insert_cross_reference(conn: &Connection, xref: &CrossReference) -> Result<bool> {
    for (id, role) in [(&xref.source_id, "source"), (&xref.target_id, "target")] {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM entities WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            bail!("{role} entity not found: {id}");
        }
    }

    let (session_id, turn_id, quote) = match &xref.citation {
        Some(c) => (
            Some(c.session_id.as_str()),
            Some(c.turn_id.as_str()),
            Some(c.quote.as_str()),
        ),
        None => (None, None, None),
    };

    let rows = conn.execute(
        "INSERT OR IGNORE INTO cross_references \
         (id, source_id, target_id, kind, session_id, turn_id, quote, \
          system_inferred, stale, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            xref.id,
            xref.source_id,
            xref.target_id,
            xref.kind,
            session_id,
            turn_id,
            quote,
            xref.system_inferred,
            xref.stale,
            xref.created_at,
        ],
    )?;
    Ok(rows > 0)
}

/// Fetch an entity by ID.
pub fn get_entity(conn: &Connection, entity_id: &str) -> Result<Option<Entity>> {
    let entity = conn
        .query_row(
            "SELECT id, category, title, fields, evidence_kind, interpretation, \
             needs_review, superseded_by, created_at, updated_at \
             FROM entities WHERE id = ?1",
            params![entity_id],
            row_to_entity,
        )
        .optional()?;
    Ok(entity)
}

/// Active (non-superseded) entities of one category, most recently updated
/// first — the order the merge engine's tie-break relies on.
pub fn active_entities(conn: &Connection, category: Category) -> Result<Vec<Entity>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, title, fields, evidence_kind, interpretation, \
         needs_review, superseded_by, created_at, updated_at \
         FROM entities WHERE category = ?1 AND superseded_by IS NULL \
         ORDER BY updated_at DESC, id DESC",
    )?;
    let entities = stmt
        .query_map(params![category.as_str()], row_to_entity)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entities)
}

/// Citations of one entity, insertion order.
pub fn entity_citations(conn: &Connection, entity_id: &str) -> Result<Vec<Citation>> {
    let mut stmt = conn.prepare(
        "SELECT session_id, turn_id, quote FROM citations WHERE entity_id = ?1 ORDER BY id",
    )?;
    let citations = stmt
        .query_map(params![entity_id], |row| {
            Ok(Citation {
                session_id: row.get(0)?,
                turn_id: row.get(1)?,
                quote: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(citations)
}

/// All cross-references touching an entity (either direction).
pub fn entity_cross_references(conn: &Connection, entity_id: &str) -> Result<Vec<CrossReference>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, target_id, kind, session_id, turn_id, quote, \
         system_inferred, stale, created_at \
         FROM cross_references WHERE source_id = ?1 OR target_id = ?1 ORDER BY created_at",
    )?;
    let xrefs = stmt
        .query_map(params![entity_id], row_to_xref)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(xrefs)
}

/// Log a dropped candidate with its full content for later review.
pub fn log_rejection(
    conn: &Connection,
    session_id: &str,
    pass: Pass,
    category: Option<&str>,
    reason: &str,
    payload: &Value,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO rejections (session_id, pass, category, reason, payload, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![session_id, pass.as_str(), category, reason, payload.to_string(), now],
    )?;
    Ok(())
}

/// Record an enrichment state transition in the audit log.
pub fn log_enrichment_state(
    conn: &Connection,
    session_id: &str,
    state: &str,
    detail: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO enrichment_log (session_id, state, detail, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![session_id, state, detail, now],
    )?;
    Ok(())
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    let category: String = row.get(1)?;
    let fields: String = row.get(3)?;
    let evidence_kind: String = row.get(4)?;
    Ok(Entity {
        id: row.get(0)?,
        category: category.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        title: row.get(2)?,
        fields: serde_json::from_str(&fields).unwrap_or_default(),
        evidence_kind: evidence_kind
            .parse()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        interpretation: row.get(5)?,
        needs_review: row.get(6)?,
        superseded_by: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_xref(row: &rusqlite::Row<'_>) -> rusqlite::Result<CrossReference> {
    let session_id: Option<String> = row.get(4)?;
    let turn_id: Option<String> = row.get(5)?;
    let quote: Option<String> = row.get(6)?;
    let citation = match (session_id, turn_id, quote) {
        (Some(session_id), Some(turn_id), Some(quote)) => Some(Citation {
            session_id,
            turn_id,
            quote,
        }),
        _ => None,
    };
    Ok(CrossReference {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        kind: row.get(3)?,
        citation,
        system_inferred: row.get(7)?,
        stale: row.get(8)?,
        created_at: row.get(9)?,
    })
}
