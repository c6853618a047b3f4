//! SQL DDL for all Chronicle tables.
//!
//! Defines the `sessions`, `turns`, `entities`, `citations`, `cross_references`,
//! `rejections`, `enrichment_log`, and `schema_meta` tables. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.
//!
//! Entities for all 33 categories live in one table partitioned by the `category`
//! column; the closed registry in [`crate::registry`] plus the indices below give
//! each category its own cheap scan without 33 near-identical DDL blocks.

use rusqlite::Connection;

/// All schema DDL statements for Chronicle's core tables.
const SCHEMA_SQL: &str = r#"
-- Conversation sessions (ground truth, immutable once completed)
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','completed','abandoned')),
    started_at TEXT NOT NULL,
    ended_at TEXT,
    enriched_at TEXT
);

-- Verbatim utterances, append-only, owned by their session
CREATE TABLE IF NOT EXISTS turns (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    speaker TEXT NOT NULL CHECK(speaker IN ('interviewer','subject')),
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(session_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id);

-- Extracted entities, one row per structured record, all categories
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    title TEXT NOT NULL,
    fields TEXT NOT NULL,
    evidence_kind TEXT NOT NULL CHECK(evidence_kind IN
        ('direct_statement','paraphrase','inference','behavioral_observation')),
    interpretation TEXT,
    needs_review INTEGER NOT NULL DEFAULT 0,
    superseded_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_category ON entities(category);
CREATE INDEX IF NOT EXISTS idx_entities_active ON entities(category, superseded_by);

-- Source citations: (session, turn, verbatim quote) tuples, never free strings
CREATE TABLE IF NOT EXISTS citations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    turn_id TEXT NOT NULL REFERENCES turns(id),
    quote TEXT NOT NULL,
    UNIQUE(entity_id, turn_id, quote)
);

CREATE INDEX IF NOT EXISTS idx_citations_entity ON citations(entity_id);

-- Typed directed links between entities
CREATE TABLE IF NOT EXISTS cross_references (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES entities(id),
    target_id TEXT NOT NULL REFERENCES entities(id),
    kind TEXT NOT NULL,
    session_id TEXT,
    turn_id TEXT,
    quote TEXT,
    system_inferred INTEGER NOT NULL DEFAULT 1,
    stale INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(source_id, target_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_xref_source ON cross_references(source_id);
CREATE INDEX IF NOT EXISTS idx_xref_target ON cross_references(target_id);

-- Dropped candidates, kept with full content for later review
CREATE TABLE IF NOT EXISTS rejections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    pass TEXT NOT NULL,
    category TEXT,
    reason TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Audit trail of enrichment state transitions
CREATE TABLE IF NOT EXISTS enrichment_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    state TEXT NOT NULL,
    detail TEXT,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "sessions",
            "turns",
            "entities",
            "citations",
            "cross_references",
            "rejections",
            "enrichment_log",
            "schema_meta",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }
}
