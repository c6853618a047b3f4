//! Response parsing and per-candidate schema validation.
//!
//! A response that is not valid JSON at all fails the whole pass. Individual
//! entries that break their category's schema are dropped and recorded as
//! violations; the rest of the pass proceeds.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Candidate, CitationCandidate, PassOutput, ProposedLink, SchemaViolation};
use crate::error::EnrichError;
use crate::registry::{Category, EvidenceKind, Pass};

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    entries: Vec<Value>,
    #[serde(default)]
    connections: Vec<WireConnection>,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    category: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    evidence_type: Option<String>,
    #[serde(default)]
    interpretation: Option<String>,
    #[serde(default)]
    citations: Vec<WireCitation>,
}

#[derive(Debug, Deserialize)]
struct WireCitation {
    turn: u32,
    quote: String,
}

#[derive(Debug, Deserialize)]
struct WireConnection {
    #[serde(default)]
    from_title: String,
    #[serde(default)]
    to_title: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    citation: Option<WireCitation>,
}

/// Parse one pass response into validated candidates plus violations.
pub fn parse_response(pass: Pass, raw: &str) -> Result<PassOutput, EnrichError> {
    let body = strip_fences(raw);
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| EnrichError::PassService {
            pass,
            message: format!("unparseable response: {e}"),
        })?;

    let mut candidates = Vec::new();
    let mut violations = Vec::new();

    for entry in wire.entries {
        match validate_entry(pass, &entry) {
            Ok(candidate) => candidates.push(candidate),
            Err(violation) => {
                tracing::warn!(%pass, reason = %violation.reason, "dropping candidate");
                violations.push(violation);
            }
        }
    }

    let links = wire
        .connections
        .into_iter()
        .filter_map(|c| {
            if c.from_title.trim().is_empty()
                || c.to_title.trim().is_empty()
                || c.kind.trim().is_empty()
            {
                tracing::debug!(%pass, "dropping incomplete connection");
                return None;
            }
            Some(ProposedLink {
                from_title: c.from_title,
                to_title: c.to_title,
                kind: c.kind,
                citation: c.citation.map(|w| CitationCandidate {
                    turn_seq: w.turn,
                    quote: w.quote,
                }),
            })
        })
        .collect();

    Ok(PassOutput {
        pass,
        candidates,
        links,
        violations,
    })
}

/// Models wrap JSON in markdown fences often enough that we strip them
/// unconditionally before parsing.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

fn validate_entry(pass: Pass, raw: &Value) -> Result<Candidate, SchemaViolation> {
    let reject = |category: Option<String>, reason: String| SchemaViolation {
        category,
        reason,
        payload: raw.clone(),
    };

    let entry: WireEntry = serde_json::from_value(raw.clone())
        .map_err(|e| reject(None, format!("entry does not match schema: {e}")))?;

    let category: Category = entry
        .category
        .parse()
        .map_err(|_| reject(None, format!("unknown category: {}", entry.category)))?;
    let category_name = Some(category.as_str().to_string());

    if category.pass() != pass {
        return Err(reject(
            category_name,
            format!(
                "category {category} belongs to the {} pass",
                category.pass()
            ),
        ));
    }

    let title = entry.title.trim();
    if title.is_empty() {
        return Err(reject(category_name, "missing title".to_string()));
    }

    let evidence_kind = match entry.evidence_type.as_deref() {
        None => EvidenceKind::DirectStatement,
        Some(s) => s
            .parse()
            .map_err(|_| reject(category_name.clone(), format!("unknown evidence type: {s}")))?,
    };

    if pass == Pass::Emotional && evidence_kind == EvidenceKind::Inference {
        return Err(reject(
            category_name,
            "emotional entries must anchor to an affect-bearing statement, not inference"
                .to_string(),
        ));
    }

    let interpretation = entry
        .interpretation
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if pass == Pass::Analytical && interpretation.is_none() {
        return Err(reject(
            category_name,
            "analytical entries require an interpretation".to_string(),
        ));
    }

    let citations: Vec<CitationCandidate> = entry
        .citations
        .into_iter()
        .filter(|c| !c.quote.trim().is_empty())
        .map(|c| CitationCandidate {
            turn_seq: c.turn,
            quote: c.quote,
        })
        .collect();
    if citations.is_empty() {
        return Err(reject(category_name, "entry has no citation".to_string()));
    }

    Ok(Candidate {
        category,
        title: title.to_string(),
        fields: entry.fields,
        evidence_kind,
        interpretation,
        citations,
    })
}
