//! Downstream semantic index notifications.
//!
//! The knowledge base is the source of truth; a semantic index is a derived
//! consumer. After a session commits, the coordinator emits one record per
//! touched entity through [`SemanticIndexSink`]. Delivery is best-effort:
//! sink failures are logged and never fail the enrichment.

use crate::store::Entity;

/// What a downstream index needs to know about a touched entity.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexRecord {
    pub entity_id: String,
    pub category: String,
    pub title: String,
    /// Flattened text of the entity's fields, for embedding.
    pub summary: String,
}

impl IndexRecord {
    pub fn from_entity(entity: &Entity) -> Self {
        let mut summary = entity.title.clone();
        for (name, value) in &entity.fields {
            if let Some(s) = value.as_str() {
                summary.push_str(&format!("; {name}: {s}"));
            }
        }
        if let Some(interpretation) = &entity.interpretation {
            summary.push_str("; ");
            summary.push_str(interpretation);
        }
        Self {
            entity_id: entity.id.clone(),
            category: entity.category.as_str().to_string(),
            title: entity.title.clone(),
            summary,
        }
    }
}

/// Post-commit notification target. Implementations must not block the
/// caller on failure; return the error and let the coordinator log it.
pub trait SemanticIndexSink {
    fn emit(&self, records: &[IndexRecord]) -> anyhow::Result<()>;
}

/// Default sink: logs what would be indexed and drops it.
#[derive(Debug, Default)]
pub struct NullIndexSink;

impl SemanticIndexSink for NullIndexSink {
    fn emit(&self, records: &[IndexRecord]) -> anyhow::Result<()> {
        tracing::debug!(count = records.len(), "no semantic index configured");
        Ok(())
    }
}
