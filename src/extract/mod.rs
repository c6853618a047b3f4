//! Pass executors — the three independent extraction procedures.
//!
//! Each pass renders one prompt from the session transcript plus a bounded
//! window of prior context, sends it to the reasoning service, and parses the
//! response into candidate entities with proposed citations. Candidates are
//! not trusted: every one goes through the grounding validator before the
//! merge engine sees it.
//!
//! Passes read the same immutable transcript and write disjoint category
//! sets, so they may run concurrently; the coordinator joins them at a
//! barrier before validation begins.

pub mod client;
pub mod parse;
pub mod prompts;

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::ExtractionConfig;
use crate::error::EnrichError;
use crate::registry::{Category, EvidenceKind, Pass};
use crate::transcript::Turn;

pub use client::{HttpReasoningClient, ReasoningService};

/// A proposed citation, referencing a turn by its sequence index within the
/// session. Resolved to a turn ID by the grounding validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationCandidate {
    pub turn_seq: u32,
    pub quote: String,
}

/// One candidate entity produced by a pass, pending validation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub category: Category,
    pub title: String,
    pub fields: Map<String, Value>,
    pub evidence_kind: EvidenceKind,
    /// Analytical inferential layer, tagged as interpretation.
    pub interpretation: Option<String>,
    pub citations: Vec<CitationCandidate>,
}

/// A connection between two candidates of this session, proposed by a pass
/// and resolved to entity IDs after merge.
#[derive(Debug, Clone)]
pub struct ProposedLink {
    pub from_title: String,
    pub to_title: String,
    pub kind: String,
    /// Present when the transcript explicitly stated the link.
    pub citation: Option<CitationCandidate>,
}

/// A candidate dropped during parsing for not matching its category schema.
/// Logged with full content, never silently discarded.
#[derive(Debug, Clone)]
pub struct SchemaViolation {
    pub category: Option<String>,
    pub reason: String,
    pub payload: Value,
}

/// Everything one pass produced for one session.
#[derive(Debug)]
pub struct PassOutput {
    pub pass: Pass,
    pub candidates: Vec<Candidate>,
    pub links: Vec<ProposedLink>,
    pub violations: Vec<SchemaViolation>,
}

/// Prior-session context relevant to one pass: recently seen entity titles
/// per owned category. Keeps the merge engine's job visible to the model so
/// repeat mentions come back under familiar titles.
#[derive(Debug, Default, Clone)]
pub struct PriorContext {
    pub known_titles: BTreeMap<Category, Vec<String>>,
}

impl PriorContext {
    /// Render as a compact prompt section, or `None` when empty.
    fn render(&self) -> Option<String> {
        if self.known_titles.values().all(|v| v.is_empty()) {
            return None;
        }
        let mut out = String::new();
        for (category, titles) in &self.known_titles {
            if titles.is_empty() {
                continue;
            }
            out.push_str(&format!("{category}: {}\n", titles.join("; ")));
        }
        Some(out)
    }
}

/// Run one extraction pass: build the prompt, call the service, parse the
/// response. Malformed responses are pass failures, not partial successes;
/// schema violations are collected per candidate and the pass continues.
pub async fn run_pass<S: ReasoningService>(
    service: &S,
    config: &ExtractionConfig,
    pass: Pass,
    subject_name: &str,
    turns: &[Turn],
    prior: &PriorContext,
) -> Result<PassOutput, EnrichError> {
    let transcript = render_transcript(turns);
    let prompt = prompts::build_prompt(pass, subject_name, &transcript, prior.render().as_deref());

    let model = match pass {
        Pass::Factual => &config.factual_model,
        Pass::Emotional | Pass::Analytical => &config.reflective_model,
    };

    tracing::debug!(%pass, model = %model, turns = turns.len(), "running extraction pass");

    let response = service
        .complete(model, &prompt, config.max_tokens)
        .await
        .map_err(|e| EnrichError::PassService {
            pass,
            message: e.to_string(),
        })?;

    let output = parse::parse_response(pass, &response)?;
    tracing::info!(
        %pass,
        candidates = output.candidates.len(),
        links = output.links.len(),
        violations = output.violations.len(),
        "pass complete"
    );
    Ok(output)
}

/// Render the turn sequence the way the passes cite it: one line per turn,
/// prefixed with its sequence index and speaker.
pub fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&format!(
            "[{}] {}: {}\n",
            turn.seq,
            turn.speaker.as_str(),
            turn.text
        ));
    }
    out
}
