//! Cross-reference builder — typed links between entities.
//!
//! Two sources of links: connections the passes proposed between this
//! session's own entries (subject-asserted when they carry a grounded
//! citation, system-inferred otherwise), and a relationship scan that links
//! entities mentioning a known person to that person's relationship record.

use std::collections::HashMap;

use crate::config::GroundingConfig;
use crate::extract::ProposedLink;
use crate::grounding;
use crate::merge::normalize;
use crate::store::{Citation, Entity};
use crate::transcript::Turn;

/// A link ready for insertion, endpoints resolved to entity IDs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    pub source_id: String,
    pub target_id: String,
    pub kind: String,
    pub citation: Option<Citation>,
    pub system_inferred: bool,
}

/// Resolve pass-proposed connections against the titles this session
/// produced. `title_index` maps a candidate title to the entity ID it ended
/// up as after merge. Links naming unknown titles are dropped; a link whose
/// citation fails grounding keeps the link but demotes it to
/// system-inferred.
pub fn resolve_links(
    links: &[ProposedLink],
    title_index: &HashMap<String, String>,
    session_id: &str,
    turns: &[Turn],
    config: &GroundingConfig,
) -> Vec<ResolvedLink> {
    let mut resolved = Vec::new();
    for link in links {
        let source = lookup(title_index, &link.from_title);
        let target = lookup(title_index, &link.to_title);
        let (Some(source_id), Some(target_id)) = (source, target) else {
            tracing::debug!(
                from = %link.from_title,
                to = %link.to_title,
                kind = %link.kind,
                "dropping connection with unresolvable endpoint"
            );
            continue;
        };
        if source_id == target_id {
            continue;
        }

        let citation = link.citation.as_ref().and_then(|proposed| {
            match grounding::ground_link_citation(turns, proposed, config) {
                Ok(grounded) => Some(grounded.to_citation(session_id)),
                Err(e) => {
                    tracing::debug!(error = %e, "link citation failed grounding, demoting to inferred");
                    None
                }
            }
        });

        resolved.push(ResolvedLink {
            source_id: source_id.clone(),
            target_id: target_id.clone(),
            kind: link.kind.clone(),
            system_inferred: citation.is_none(),
            citation,
        });
    }
    resolved
}

fn lookup<'a>(index: &'a HashMap<String, String>, title: &str) -> Option<&'a String> {
    index.get(&normalize(title))
}

/// Build the title index for [`resolve_links`] from (title, entity ID)
/// pairs, keyed by normalized title.
pub fn title_index(entries: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
    entries
        .into_iter()
        .map(|(title, id)| (normalize(&title), id))
        .collect()
}

/// Scan entities touched this session for mentions of known people and link
/// them to the person's relationship record. Always system-inferred; the
/// subject never asserted these.
pub fn infer_person_links(touched: &[Entity], people: &[Entity]) -> Vec<ResolvedLink> {
    let mut links = Vec::new();
    for person in people {
        let name = normalize(
            person
                .fields
                .get("person_name")
                .and_then(|v| v.as_str())
                .unwrap_or(&person.title),
        );
        if name.is_empty() {
            continue;
        }

        for entity in touched {
            if entity.id == person.id {
                continue;
            }
            if mentions(&entity_text(entity), &name) {
                links.push(ResolvedLink {
                    source_id: entity.id.clone(),
                    target_id: person.id.clone(),
                    kind: "involves_person".to_string(),
                    citation: None,
                    system_inferred: true,
                });
            }
        }
    }
    links
}

/// True when the name's tokens appear contiguously in the haystack. Both
/// sides are already normalized, so this is a whole-token comparison; a
/// haystack that IS the name exactly still matches.
fn mentions(haystack: &str, name: &str) -> bool {
    let name_tokens: Vec<&str> = name.split_whitespace().collect();
    if name_tokens.is_empty() {
        return false;
    }
    let tokens: Vec<&str> = haystack.split_whitespace().collect();
    tokens.windows(name_tokens.len()).any(|w| w == name_tokens)
}

fn entity_text(entity: &Entity) -> String {
    let mut text = normalize(&entity.title);
    for value in entity.fields.values() {
        if let Some(s) = value.as_str() {
            text.push(' ');
            text.push_str(&normalize(s));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CitationCandidate;
    use crate::registry::{Category, EvidenceKind};
    use crate::transcript::Speaker;
    use serde_json::json;

    fn turn(seq: u32, text: &str) -> Turn {
        Turn {
            id: format!("turn-{seq}"),
            session_id: "s1".into(),
            seq,
            speaker: Speaker::Subject,
            text: text.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn entity(id: &str, category: Category, title: &str, fields: serde_json::Value) -> Entity {
        let now = chrono::Utc::now().to_rfc3339();
        Entity {
            id: id.into(),
            category,
            title: title.into(),
            fields: fields.as_object().cloned().unwrap_or_default(),
            evidence_kind: EvidenceKind::DirectStatement,
            interpretation: None,
            needs_review: false,
            superseded_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn link(from: &str, to: &str, citation: Option<(u32, &str)>) -> ProposedLink {
        ProposedLink {
            from_title: from.into(),
            to_title: to.into(),
            kind: "caused_by".into(),
            citation: citation.map(|(turn_seq, quote)| CitationCandidate {
                turn_seq,
                quote: quote.into(),
            }),
        }
    }

    #[test]
    fn cited_link_is_subject_asserted() {
        let turns = vec![turn(0, "I left the farm because my father died.")];
        let index = title_index([
            ("Leaving the farm".to_string(), "e1".to_string()),
            ("Father's death".to_string(), "e2".to_string()),
        ]);
        let links = vec![link(
            "Leaving the farm",
            "Father's death",
            Some((0, "because my father died")),
        )];
        let resolved = resolve_links(&links, &index, "s1", &turns, &GroundingConfig::default());
        assert_eq!(resolved.len(), 1);
        assert!(!resolved[0].system_inferred);
        assert_eq!(
            resolved[0].citation.as_ref().unwrap().quote,
            "because my father died"
        );
    }

    #[test]
    fn citationless_link_is_system_inferred() {
        let index = title_index([
            ("A".to_string(), "e1".to_string()),
            ("B".to_string(), "e2".to_string()),
        ]);
        let resolved = resolve_links(
            &[link("A", "B", None)],
            &index,
            "s1",
            &[],
            &GroundingConfig::default(),
        );
        assert!(resolved[0].system_inferred);
        assert!(resolved[0].citation.is_none());
    }

    #[test]
    fn ungroundable_citation_demotes_to_inferred() {
        let turns = vec![turn(0, "I left the farm.")];
        let index = title_index([
            ("A".to_string(), "e1".to_string()),
            ("B".to_string(), "e2".to_string()),
        ]);
        let resolved = resolve_links(
            &[link("A", "B", Some((0, "words that were never spoken at all")))],
            &index,
            "s1",
            &turns,
            &GroundingConfig::default(),
        );
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].system_inferred);
        assert!(resolved[0].citation.is_none());
    }

    #[test]
    fn unresolvable_endpoint_drops_the_link() {
        let index = title_index([("A".to_string(), "e1".to_string())]);
        let resolved = resolve_links(
            &[link("A", "Never extracted", None)],
            &index,
            "s1",
            &[],
            &GroundingConfig::default(),
        );
        assert!(resolved.is_empty());
    }

    #[test]
    fn person_scan_links_mentions() {
        let father = entity(
            "person-1",
            Category::Relationships,
            "Father",
            json!({ "person_name": "Father" }),
        );
        let story = entity(
            "story-1",
            Category::Stories,
            "Fishing with Dad",
            json!({ "point_or_lesson": "my dad taught patience" }),
        );
        let unrelated = entity(
            "joy-1",
            Category::Joys,
            "Morning swims",
            json!({}),
        );

        let links = infer_person_links(&[story, unrelated], &[father]);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source_id, "story-1");
        assert_eq!(links[0].target_id, "person-1");
        assert_eq!(links[0].kind, "involves_person");
        assert!(links[0].system_inferred);
    }

    #[test]
    fn whole_title_mention_is_linked() {
        let father = entity(
            "person-1",
            Category::Relationships,
            "Father",
            json!({ "person_name": "Father" }),
        );
        // entire normalized text equals the person's name
        let loss = entity("loss-1", Category::Losses, "Dad", json!({}));

        let links = infer_person_links(&[loss], &[father]);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source_id, "loss-1");
        assert_eq!(links[0].target_id, "person-1");
    }

    #[test]
    fn partial_token_overlap_is_not_a_mention() {
        let person = entity(
            "person-1",
            Category::Relationships,
            "Grandfather",
            json!({ "person_name": "Grandfather" }),
        );
        // "grand" and "father" as separate tokens must not match "grandfather"
        let story = entity(
            "story-1",
            Category::Stories,
            "The grand old father figure",
            json!({}),
        );

        assert!(infer_person_links(&[story], &[person]).is_empty());
    }
}
