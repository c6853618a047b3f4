//! Merge engine — convergence of repeat mentions across sessions.
//!
//! Each grounded candidate is scored against the active entities of its
//! category using Jaro-Winkler similarity over a normalized key built from
//! the title and the category's merge-key fields. Normalization folds case,
//! punctuation, and common kinship aliases so "Dad" and "my father" land on
//! the same key.
//!
//! Decisions are deterministic: candidates are scored against a snapshot of
//! existing entities taken before any pass output is applied, entities are
//! visited in recency order, and a tied score keeps the first (most recent)
//! match.

use serde_json::{Map, Value};
use strsim::jaro_winkler;

use crate::config::MergeConfig;
use crate::extract::Candidate;
use crate::registry::Category;
use crate::store::Entity;

/// What to do with one grounded candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeDecision {
    /// No existing entity is close enough. Insert as a new entity, optionally
    /// cross-referenced to the nearest neighbor, optionally flagged for
    /// review when the score fell just short of merging.
    InsertNew {
        related_to: Option<String>,
        needs_review: bool,
    },
    /// Same underlying entity. Union citations, fill missing fields, and
    /// overwrite refinable ones.
    Augment { existing_id: String },
    /// Same underlying entity but a non-refinable field conflicts. The old
    /// version is retired in favor of a fresh entity carrying both citation
    /// sets.
    Supersede { existing_id: String },
}

/// Decide the fate of a candidate against the category's active entities.
///
/// `existing` must be ordered most recently updated first; see
/// [`crate::store::active_entities`].
pub fn decide(candidate: &Candidate, existing: &[Entity], config: &MergeConfig) -> MergeDecision {
    let key = candidate_key(candidate);

    let mut best: Option<(&Entity, f64)> = None;
    for entity in existing {
        let score = jaro_winkler(&key, &entity_key(entity));
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((entity, score));
        }
    }

    match best {
        None => MergeDecision::InsertNew {
            related_to: None,
            needs_review: false,
        },
        Some((entity, score)) => {
            let decision = classify(candidate, entity, score, config);
            tracing::debug!(
                category = %candidate.category,
                title = %candidate.title,
                nearest = %entity.title,
                score,
                ?decision,
                "merge decision"
            );
            decision
        }
    }
}

/// Map a similarity score and field comparison onto a decision. The merge
/// boundary is inclusive.
fn classify(
    candidate: &Candidate,
    existing: &Entity,
    score: f64,
    config: &MergeConfig,
) -> MergeDecision {
    if score >= config.merge_threshold {
        if has_hard_conflict(candidate.category, &candidate.fields, &existing.fields) {
            MergeDecision::Supersede {
                existing_id: existing.id.clone(),
            }
        } else {
            MergeDecision::Augment {
                existing_id: existing.id.clone(),
            }
        }
    } else {
        let needs_review = score >= config.merge_threshold - config.ambiguity_margin;
        if needs_review {
            tracing::warn!(
                category = %candidate.category,
                title = %candidate.title,
                nearest = %existing.title,
                score,
                "merge similarity inside the ambiguity margin, inserting flagged for review"
            );
        }
        let related_to = (score >= config.related_threshold).then(|| existing.id.clone());
        MergeDecision::InsertNew {
            related_to,
            needs_review,
        }
    }
}

/// True when any field present on both sides disagrees and is not declared
/// refinable for the category. Such a conflict means the old record is a
/// different version of the truth, not a sparser one.
fn has_hard_conflict(
    category: Category,
    candidate_fields: &Map<String, Value>,
    existing_fields: &Map<String, Value>,
) -> bool {
    let refinable = category.refinable_fields();
    for (name, new_value) in candidate_fields {
        if refinable.contains(&name.as_str()) {
            continue;
        }
        let Some(old_value) = existing_fields.get(name) else {
            continue;
        };
        if !values_agree(old_value, new_value) {
            return true;
        }
    }
    false
}

fn values_agree(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => normalize(a) == normalize(b),
        _ => a == b,
    }
}

/// Merge the candidate's fields into the existing ones for an augment:
/// missing fields are filled, refinable fields are overwritten, everything
/// else keeps the existing value.
pub fn merged_fields(
    category: Category,
    existing_fields: &Map<String, Value>,
    candidate_fields: &Map<String, Value>,
) -> Map<String, Value> {
    let refinable = category.refinable_fields();
    let mut merged = existing_fields.clone();
    for (name, value) in candidate_fields {
        if value.is_null() {
            continue;
        }
        let overwrite = refinable.contains(&name.as_str()) || !merged.contains_key(name);
        if overwrite {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

fn candidate_key(candidate: &Candidate) -> String {
    key_text(
        candidate.category,
        &candidate.title,
        &candidate.fields,
    )
}

fn entity_key(entity: &Entity) -> String {
    key_text(entity.category, &entity.title, &entity.fields)
}

fn key_text(category: Category, title: &str, fields: &Map<String, Value>) -> String {
    let mut parts = vec![normalize(title)];
    for field in category.merge_key_fields() {
        if let Some(value) = fields.get(*field).and_then(Value::as_str) {
            let normalized = normalize(value);
            // skip values that restate the title
            if !normalized.is_empty() && !parts.contains(&normalized) {
                parts.push(normalized);
            }
        }
    }
    parts.join(" ")
}

/// Lowercase, strip punctuation, collapse whitespace, and fold kinship
/// aliases onto a canonical token.
pub fn normalize(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '\u{2019}')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let lower = w.to_lowercase().replace('\u{2019}', "'");
            kin_alias(&lower).unwrap_or(lower)
        })
        .filter(|w| w != "my")
        .collect::<Vec<_>>()
        .join(" ")
}

fn kin_alias(word: &str) -> Option<String> {
    let canonical = match word {
        "dad" | "daddy" | "pa" | "papa" => "father",
        "mom" | "mommy" | "ma" | "mama" | "mum" => "mother",
        "grandma" | "granny" | "nana" => "grandmother",
        "grandpa" | "gramps" => "grandfather",
        _ => return None,
    };
    Some(canonical.to_string())
}
