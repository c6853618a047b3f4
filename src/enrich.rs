//! Enrichment coordinator — drives one session through the pipeline.
//!
//! The pipeline runs the three passes concurrently against the immutable
//! transcript, grounds and merges their output in memory, then applies the
//! whole write set in a single transaction. Until that transaction commits,
//! nothing is visible; a failure at any stage leaves the session pending and
//! re-runnable. Sessions of one subject are enriched one at a time, which
//! the `&mut Connection` receiver enforces at compile time.

use std::collections::HashMap;
use std::time::Duration;

use rusqlite::Connection;
use serde_json::{json, Map, Value};

use crate::config::ChronicleConfig;
use crate::crossref::{self, ResolvedLink};
use crate::error::EnrichError;
use crate::extract::{self, Candidate, PassOutput, PriorContext, ProposedLink, ReasoningService};
use crate::grounding::{self, GroundedCandidate};
use crate::index::{IndexRecord, SemanticIndexSink};
use crate::merge::{self, MergeDecision};
use crate::registry::{Category, Pass};
use crate::store::{self, CrossReference, Entity};
use crate::transcript::{self, SessionStatus, Turn};

/// Pipeline stage, recorded in the enrichment audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentState {
    Pending,
    PassesRunning,
    Validating,
    Merging,
    CrossReferencing,
    Committed,
    Failed,
}

impl EnrichmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PassesRunning => "passes_running",
            Self::Validating => "validating",
            Self::Merging => "merging",
            Self::CrossReferencing => "cross_referencing",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EnrichmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tally of what one enrichment run did.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub session_id: String,
    /// True when the session was already enriched and nothing was done.
    pub skipped: bool,
    pub entities_created: usize,
    pub entities_augmented: usize,
    pub entities_superseded: usize,
    pub citations_added: usize,
    pub links_created: usize,
    pub candidates_rejected: usize,
}

struct Rejection {
    pass: Pass,
    category: Option<String>,
    reason: String,
    payload: Value,
}

/// Enrich one completed session. Re-running on an already-enriched session
/// is a no-op.
pub async fn enrich_session<S: ReasoningService>(
    conn: &mut Connection,
    service: &S,
    config: &ChronicleConfig,
    sink: &dyn SemanticIndexSink,
    session_id: &str,
) -> Result<EnrichmentReport, EnrichError> {
    let session = transcript::get_session(conn, session_id)?
        .ok_or_else(|| EnrichError::SessionState(format!("session not found: {session_id}")))?;

    if session.enriched_at.is_some() {
        tracing::info!(session_id, "session already enriched, skipping");
        return Ok(EnrichmentReport {
            session_id: session_id.to_string(),
            skipped: true,
            ..Default::default()
        });
    }
    if session.status != SessionStatus::Completed {
        return Err(EnrichError::SessionState(format!(
            "cannot enrich {} session {session_id}",
            session.status
        )));
    }

    let turns = transcript::session_turns(conn, session_id)?;
    if turns.is_empty() {
        // Nothing to extract; commit the trivial result so the session does
        // not stay pending forever.
        let tx = conn.transaction().map_err(anyhow::Error::from)?;
        mark_enriched(&tx, session_id)?;
        store::log_enrichment_state(&tx, session_id, EnrichmentState::Committed.as_str(), None)?;
        tx.commit().map_err(anyhow::Error::from)?;
        tracing::info!(session_id, "empty transcript, committed trivially");
        return Ok(EnrichmentReport {
            session_id: session_id.to_string(),
            ..Default::default()
        });
    }

    // Snapshot of active entities, taken before any pass output is applied.
    // Prior context and every merge decision are computed against it, which
    // keeps the outcome independent of pass completion order.
    let mut snapshot: HashMap<Category, Vec<Entity>> = HashMap::new();
    for category in Category::ALL {
        snapshot.insert(*category, store::active_entities(conn, *category)?);
    }

    store::log_enrichment_state(
        conn,
        session_id,
        EnrichmentState::PassesRunning.as_str(),
        None,
    )?;

    let outcome = run_passes(service, config, &turns, &snapshot).await;
    let outputs = match outcome {
        Ok(outputs) => outputs,
        Err(e) => {
            record_failure(conn, session_id, &e);
            return Err(e);
        }
    };

    store::log_enrichment_state(conn, session_id, EnrichmentState::Validating.as_str(), None)?;
    let (grounded, links, rejections) = validate(config, &turns, outputs);

    match apply(conn, config, session_id, &turns, snapshot, grounded, links, rejections) {
        Ok((report, touched)) => {
            let records: Vec<IndexRecord> = touched.iter().map(IndexRecord::from_entity).collect();
            if let Err(e) = sink.emit(&records) {
                tracing::warn!(error = %e, "semantic index notification failed");
            }
            tracing::info!(
                session_id,
                created = report.entities_created,
                augmented = report.entities_augmented,
                superseded = report.entities_superseded,
                links = report.links_created,
                rejected = report.candidates_rejected,
                "session enriched"
            );
            Ok(report)
        }
        Err(e) => {
            record_failure(conn, session_id, &e);
            Err(e)
        }
    }
}

/// Enrich every pending session, oldest first. Stops at the first failure.
pub async fn enrich_pending<S: ReasoningService>(
    conn: &mut Connection,
    service: &S,
    config: &ChronicleConfig,
    sink: &dyn SemanticIndexSink,
) -> Result<Vec<EnrichmentReport>, EnrichError> {
    let pending = transcript::pending_sessions(conn)?;
    let mut reports = Vec::with_capacity(pending.len());
    for session in pending {
        reports.push(enrich_session(conn, service, config, sink, &session.id).await?);
    }
    Ok(reports)
}

async fn run_passes<S: ReasoningService>(
    service: &S,
    config: &ChronicleConfig,
    turns: &[Turn],
    snapshot: &HashMap<Category, Vec<Entity>>,
) -> Result<[PassOutput; 3], EnrichError> {
    let subject = &config.app.subject_name;
    let (factual, emotional, analytical) = tokio::try_join!(
        timed_pass(service, config, Pass::Factual, subject, turns, snapshot),
        timed_pass(service, config, Pass::Emotional, subject, turns, snapshot),
        timed_pass(service, config, Pass::Analytical, subject, turns, snapshot),
    )?;
    Ok([factual, emotional, analytical])
}

async fn timed_pass<S: ReasoningService>(
    service: &S,
    config: &ChronicleConfig,
    pass: Pass,
    subject: &str,
    turns: &[Turn],
    snapshot: &HashMap<Category, Vec<Entity>>,
) -> Result<PassOutput, EnrichError> {
    let prior = prior_context(pass, snapshot, config.extraction.prior_context_per_category);
    let timeout = Duration::from_secs(config.extraction.timeout_secs);
    match tokio::time::timeout(
        timeout,
        extract::run_pass(service, &config.extraction, pass, subject, turns, &prior),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(EnrichError::PassTimeout {
            pass,
            seconds: config.extraction.timeout_secs,
        }),
    }
}

fn prior_context(
    pass: Pass,
    snapshot: &HashMap<Category, Vec<Entity>>,
    per_category: usize,
) -> PriorContext {
    let mut prior = PriorContext::default();
    for category in pass.categories() {
        let titles: Vec<String> = snapshot
            .get(&category)
            .map(|entities| {
                entities
                    .iter()
                    .take(per_category)
                    .map(|e| e.title.clone())
                    .collect()
            })
            .unwrap_or_default();
        prior.known_titles.insert(category, titles);
    }
    prior
}

/// Ground every candidate. Failures become rejections; the session goes on.
fn validate(
    config: &ChronicleConfig,
    turns: &[Turn],
    outputs: [PassOutput; 3],
) -> (
    Vec<GroundedCandidate>,
    Vec<ProposedLink>,
    Vec<Rejection>,
) {
    let mut grounded = Vec::new();
    let mut links = Vec::new();
    let mut rejections = Vec::new();

    for output in outputs {
        let pass = output.pass;
        for violation in output.violations {
            let error = EnrichError::SchemaViolation {
                reason: violation.reason,
            };
            tracing::warn!(%pass, error = %error, "rejecting schema-violating candidate");
            rejections.push(Rejection {
                pass,
                category: violation.category,
                reason: error.to_string(),
                payload: violation.payload,
            });
        }
        for candidate in output.candidates {
            let payload = candidate_payload(&candidate);
            match grounding::ground_candidate(turns, candidate, &config.grounding) {
                Ok(g) => grounded.push(g),
                Err(e) => {
                    tracing::warn!(%pass, error = %e, "rejecting ungrounded candidate");
                    rejections.push(Rejection {
                        pass,
                        category: payload["category"].as_str().map(str::to_string),
                        reason: e.to_string(),
                        payload,
                    });
                }
            }
        }
        links.extend(output.links);
    }

    (grounded, links, rejections)
}

/// Apply the session's entire write set in one transaction.
#[allow(clippy::too_many_arguments)]
fn apply(
    conn: &mut Connection,
    config: &ChronicleConfig,
    session_id: &str,
    turns: &[Turn],
    mut snapshot: HashMap<Category, Vec<Entity>>,
    grounded: Vec<GroundedCandidate>,
    links: Vec<ProposedLink>,
    rejections: Vec<Rejection>,
) -> Result<(EnrichmentReport, Vec<Entity>), EnrichError> {
    let tx = conn.transaction().map_err(anyhow::Error::from)?;

    let mut report = EnrichmentReport {
        session_id: session_id.to_string(),
        candidates_rejected: rejections.len(),
        ..Default::default()
    };

    store::log_enrichment_state(&tx, session_id, EnrichmentState::Merging.as_str(), None)?;

    let mut title_ids: Vec<(String, String)> = Vec::new();
    let mut touched_ids: Vec<String> = Vec::new();

    for g in grounded {
        let category = g.candidate.category;
        let existing = snapshot.entry(category).or_default();
        let decision = merge::decide(&g.candidate, existing, &config.merge);

        let entity_id = match decision {
            MergeDecision::InsertNew {
                related_to,
                needs_review,
            } => {
                let entity = new_entity(&g.candidate, g.candidate.fields.clone(), needs_review);
                store::insert_entity(&tx, &entity)?;
                report.entities_created += 1;
                if let Some(target_id) = related_to {
                    let link = ResolvedLink {
                        source_id: entity.id.clone(),
                        target_id,
                        kind: "related_to".to_string(),
                        citation: None,
                        system_inferred: true,
                    };
                    if insert_link(&tx, &link)? {
                        report.links_created += 1;
                    }
                }
                existing.insert(0, entity.clone());
                entity.id
            }
            MergeDecision::Augment { existing_id } => {
                let position = existing
                    .iter()
                    .position(|e| e.id == existing_id)
                    .ok_or_else(|| {
                        anyhow::anyhow!("merge target missing from snapshot: {existing_id}")
                    })?;
                let mut entity = existing.remove(position);
                entity.fields = merge::merged_fields(category, &entity.fields, &g.candidate.fields);
                store::update_entity_fields(&tx, &entity.id, &entity.fields)?;
                report.entities_augmented += 1;
                existing.insert(0, entity);
                existing_id
            }
            MergeDecision::Supersede { existing_id } => {
                let position = existing
                    .iter()
                    .position(|e| e.id == existing_id)
                    .ok_or_else(|| {
                        anyhow::anyhow!("supersession target missing from snapshot: {existing_id}")
                    })?;
                let old = existing.remove(position);

                // New version keeps the candidate's values; old fields carry
                // over only where the candidate is silent.
                let mut fields = g.candidate.fields.clone();
                for (name, value) in &old.fields {
                    fields.entry(name.clone()).or_insert_with(|| value.clone());
                }
                let entity = new_entity(&g.candidate, fields, false);
                store::insert_entity(&tx, &entity)?;
                for citation in store::entity_citations(&tx, &old.id)? {
                    store::add_citation(&tx, &entity.id, &citation)?;
                }
                store::supersede_entity(&tx, &old.id, &entity.id)?;
                report.entities_superseded += 1;
                existing.insert(0, entity.clone());
                entity.id
            }
        };

        for citation in &g.citations {
            store::add_citation(&tx, &entity_id, &citation.to_citation(session_id))?;
        }
        report.citations_added += g.citations.len();
        title_ids.push((g.candidate.title.clone(), entity_id.clone()));
        if !touched_ids.contains(&entity_id) {
            touched_ids.push(entity_id);
        }
    }

    store::log_enrichment_state(
        &tx,
        session_id,
        EnrichmentState::CrossReferencing.as_str(),
        None,
    )?;

    let touched: Vec<Entity> = snapshot
        .values()
        .flatten()
        .filter(|e| touched_ids.contains(&e.id))
        .cloned()
        .collect();
    let people = snapshot
        .get(&Category::Relationships)
        .cloned()
        .unwrap_or_default();

    let index = crossref::title_index(title_ids);
    let mut resolved = crossref::resolve_links(&links, &index, session_id, turns, &config.grounding);
    resolved.extend(crossref::infer_person_links(&touched, &people));
    for link in &resolved {
        if insert_link(&tx, link)? {
            report.links_created += 1;
        }
    }

    for rejection in &rejections {
        store::log_rejection(
            &tx,
            session_id,
            rejection.pass,
            rejection.category.as_deref(),
            &rejection.reason,
            &rejection.payload,
        )?;
    }

    mark_enriched(&tx, session_id)?;
    store::log_enrichment_state(
        &tx,
        session_id,
        EnrichmentState::Committed.as_str(),
        Some(crate::db::migrations::PROMPT_VERSION),
    )?;
    tx.commit().map_err(anyhow::Error::from)?;

    Ok((report, touched))
}

fn insert_link(conn: &Connection, link: &ResolvedLink) -> Result<bool, EnrichError> {
    let xref = CrossReference {
        id: uuid::Uuid::now_v7().to_string(),
        source_id: link.source_id.clone(),
        target_id: link.target_id.clone(),
        kind: link.kind.clone(),
        citation: link.citation.clone(),
        system_inferred: link.system_inferred,
        stale: false,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    Ok(store::insert_cross_reference(conn, &xref)?)
}

fn new_entity(candidate: &Candidate, fields: Map<String, Value>, needs_review: bool) -> Entity {
    let now = chrono::Utc::now().to_rfc3339();
    Entity {
        id: uuid::Uuid::now_v7().to_string(),
        category: candidate.category,
        title: candidate.title.clone(),
        fields,
        evidence_kind: candidate.evidence_kind,
        interpretation: candidate.interpretation.clone(),
        needs_review,
        superseded_by: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn mark_enriched(conn: &Connection, session_id: &str) -> Result<(), EnrichError> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE sessions SET enriched_at = ?1 WHERE id = ?2 AND enriched_at IS NULL",
        rusqlite::params![now, session_id],
    )
    .map_err(anyhow::Error::from)?;
    Ok(())
}

fn record_failure(conn: &Connection, session_id: &str, error: &EnrichError) {
    tracing::error!(session_id, error = %error, "enrichment failed, session stays pending");
    if let Err(e) = store::log_enrichment_state(
        conn,
        session_id,
        EnrichmentState::Failed.as_str(),
        Some(&error.to_string()),
    ) {
        tracing::warn!(error = %e, "could not record failure state");
    }
}

fn candidate_payload(candidate: &Candidate) -> Value {
    json!({
        "category": candidate.category.as_str(),
        "title": candidate.title,
        "fields": candidate.fields,
        "evidence_type": candidate.evidence_kind.as_str(),
        "interpretation": candidate.interpretation,
        "citations": candidate
            .citations
            .iter()
            .map(|c| json!({ "turn": c.turn_seq, "quote": c.quote }))
            .collect::<Vec<_>>(),
    })
}
