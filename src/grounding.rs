//! Grounding validator — every claim must trace to transcript text.
//!
//! A candidate's citations are checked against the actual turns of the
//! session. Matching is tolerant of case, whitespace, and punctuation, but
//! the stored quote is always the transcript's own words for the matched
//! span, never the model's rendition. A near-miss is repaired by keeping the
//! longest contiguous run of quote words found in the turn, provided the run
//! clears the repair floor; anything below it rejects the whole candidate.

use crate::config::GroundingConfig;
use crate::error::EnrichError;
use crate::extract::{Candidate, CitationCandidate};
use crate::store::Citation;
use crate::transcript::Turn;

/// A citation that passed validation, resolved to a turn ID and carrying the
/// transcript's verbatim text for the matched span.
#[derive(Debug, Clone)]
pub struct GroundedCitation {
    pub turn_id: String,
    pub turn_seq: u32,
    pub quote: String,
    /// True when the stored quote is a trimmed-down repair of what the model
    /// proposed rather than a full match.
    pub repaired: bool,
}

impl GroundedCitation {
    pub fn to_citation(&self, session_id: &str) -> Citation {
        Citation {
            session_id: session_id.to_string(),
            turn_id: self.turn_id.clone(),
            quote: self.quote.clone(),
        }
    }
}

/// A candidate whose every citation survived grounding.
#[derive(Debug, Clone)]
pub struct GroundedCandidate {
    pub candidate: Candidate,
    pub citations: Vec<GroundedCitation>,
}

/// Validate all citations of a candidate against the session turns.
///
/// All-or-nothing per candidate: one unsalvageable citation rejects the
/// candidate with [`EnrichError::Grounding`], which the coordinator logs
/// and recovers from locally.
pub fn ground_candidate(
    turns: &[Turn],
    candidate: Candidate,
    config: &GroundingConfig,
) -> Result<GroundedCandidate, EnrichError> {
    let mut citations = Vec::with_capacity(candidate.citations.len());
    for proposed in &candidate.citations {
        citations.push(ground_citation(turns, proposed, config)?);
    }
    Ok(GroundedCandidate {
        candidate,
        citations,
    })
}

/// Validate a single connection citation. Same matching rules as entity
/// citations.
pub fn ground_link_citation(
    turns: &[Turn],
    proposed: &CitationCandidate,
    config: &GroundingConfig,
) -> Result<GroundedCitation, EnrichError> {
    ground_citation(turns, proposed, config)
}

fn ground_citation(
    turns: &[Turn],
    proposed: &CitationCandidate,
    config: &GroundingConfig,
) -> Result<GroundedCitation, EnrichError> {
    let ungrounded = |reason: String| EnrichError::Grounding { reason };

    let turn = turns.iter().find(|t| t.seq == proposed.turn_seq).ok_or_else(|| {
        ungrounded(format!(
            "citation references nonexistent turn {}",
            proposed.turn_seq
        ))
    })?;

    let quote_tokens = tokenize(&proposed.quote);
    if quote_tokens.is_empty() {
        return Err(ungrounded(format!("empty quote for turn {}", proposed.turn_seq)));
    }
    let turn_tokens = tokenize(&turn.text);

    let (start, len) = longest_common_run(&quote_tokens, &turn_tokens);
    let verbatim = len == quote_tokens.len();

    if !verbatim {
        let ratio = len as f64 / quote_tokens.len() as f64;
        if len < config.repair_min_tokens || ratio < config.repair_min_ratio {
            return Err(ungrounded(format!(
                "quote not found in turn {} (best overlap {len} of {} words)",
                proposed.turn_seq,
                quote_tokens.len()
            )));
        }
        tracing::debug!(
            turn = proposed.turn_seq,
            kept = len,
            of = quote_tokens.len(),
            "repaired citation to longest matching span"
        );
    }

    // Store the turn's own text for the matched span.
    let first = &turn_tokens[start];
    let last = &turn_tokens[start + len - 1];
    let quote = turn.text[first.start..last.end].to_string();

    Ok(GroundedCitation {
        turn_id: turn.id.clone(),
        turn_seq: turn.seq,
        quote,
        repaired: !verbatim,
    })
}

#[derive(Debug)]
struct Token {
    /// Lowercased, apostrophes normalized.
    norm: String,
    start: usize,
    end: usize,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<(usize, String)> = None;
    for (i, c) in text.char_indices() {
        let word_char = c.is_alphanumeric() || c == '\'' || c == '\u{2019}';
        if word_char {
            let mapped = if c == '\u{2019}' { '\'' } else { c };
            match &mut current {
                Some((_, buf)) => buf.extend(mapped.to_lowercase()),
                None => {
                    let mut buf = String::new();
                    buf.extend(mapped.to_lowercase());
                    current = Some((i, buf));
                }
            }
        } else if let Some((start, buf)) = current.take() {
            tokens.push(Token {
                norm: buf,
                start,
                end: i,
            });
        }
    }
    if let Some((start, buf)) = current {
        tokens.push(Token {
            norm: buf,
            start,
            end: text.len(),
        });
    }
    tokens
}

/// Longest contiguous run of `quote` tokens appearing, in order and
/// adjacently, within `turn`. Returns (start index in turn, run length).
fn longest_common_run(quote: &[Token], turn: &[Token]) -> (usize, usize) {
    let mut best = (0, 0);
    // prev[j] = length of common run ending at quote[i-1], turn[j-1]
    let mut prev = vec![0usize; turn.len() + 1];
    for q in quote {
        let mut row = vec![0usize; turn.len() + 1];
        for (j, t) in turn.iter().enumerate() {
            if q.norm == t.norm {
                let len = prev[j] + 1;
                row[j + 1] = len;
                if len > best.1 {
                    best = (j + 1 - len, len);
                }
            }
        }
        prev = row;
    }
    best
}
