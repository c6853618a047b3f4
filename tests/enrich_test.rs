mod helpers;

use chronicle::enrich::enrich_session;
use chronicle::error::EnrichError;
use chronicle::index::NullIndexSink;
use chronicle::registry::Category;
use chronicle::store;
use chronicle::transcript::{get_session, Speaker};
use helpers::*;
use serde_json::json;

fn interview() -> Vec<(Speaker, &'static str)> {
    vec![
        (Speaker::Interviewer, "Tell me about your father."),
        (
            Speaker::Subject,
            "My father taught me to fish on Lake Erie. We went every summer.",
        ),
        (Speaker::Interviewer, "How do you feel about water now?"),
        (
            Speaker::Subject,
            "I'm still afraid of deep water. I never learned to swim properly.",
        ),
    ]
}

fn scripted() -> ScriptedService {
    ScriptedService {
        factual: response(
            vec![
                entry(
                    "relationships",
                    "Father",
                    json!({ "person_name": "Father", "relation": "father" }),
                    1,
                    "My father taught me to fish",
                ),
                entry(
                    "skills",
                    "Fishing",
                    json!({ "skill_name": "fishing" }),
                    1,
                    "taught me to fish on Lake Erie",
                ),
                // fabricated quote: must be rejected by grounding
                entry(
                    "stories",
                    "The storm",
                    json!({}),
                    1,
                    "we nearly drowned in a terrible storm",
                ),
                // wrong pass: fears belongs to the emotional pass
                entry(
                    "fears",
                    "Fear of water",
                    json!({ "fear": "water" }),
                    3,
                    "I'm still afraid of deep water",
                ),
            ],
            vec![],
        ),
        emotional: response(
            vec![entry(
                "fears",
                "Fear of deep water",
                json!({ "fear": "deep water" }),
                3,
                "I'm still afraid of deep water",
            )],
            vec![json!({
                "from_title": "Fear of deep water",
                "to_title": "Fishing",
                "kind": "originates_from",
                "citation": { "turn": 3, "quote": "I never learned to swim" }
            })],
        ),
        analytical: response(
            vec![json!({
                "category": "wisdom",
                "title": "Water demands respect",
                "fields": { "insight": "water demands respect" },
                "evidence_type": "paraphrase",
                "interpretation": "Frames the fear as a lesson rather than a weakness.",
                "citations": [{ "turn": 3, "quote": "I never learned to swim properly" }]
            })],
            vec![],
        ),
    }
}

#[tokio::test]
async fn full_session_enrichment() {
    let mut conn = test_db();
    let config = test_config();
    let sid = seeded_session(&conn, &interview());

    let report = enrich_session(&mut conn, &scripted(), &config, &NullIndexSink, &sid)
        .await
        .unwrap();

    assert_eq!(report.entities_created, 4);
    assert_eq!(report.entities_augmented, 0);
    assert_eq!(report.candidates_rejected, 2);

    // grounded quote is stored as the transcript's own text
    let fathers = store::active_entities(&conn, Category::Relationships).unwrap();
    assert_eq!(fathers.len(), 1);
    let citations = store::entity_citations(&conn, &fathers[0].id).unwrap();
    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0].quote, "My father taught me to fish");

    // the interpretation stays separate from the citation
    let wisdom = store::active_entities(&conn, Category::Wisdom).unwrap();
    assert!(wisdom[0]
        .interpretation
        .as_deref()
        .unwrap()
        .contains("lesson"));

    // subject-asserted link between the fear and the skill
    let fears = store::active_entities(&conn, Category::Fears).unwrap();
    assert_eq!(fears.len(), 1);
    let links = store::entity_cross_references(&conn, &fears[0].id).unwrap();
    let link = links.iter().find(|l| l.kind == "originates_from").unwrap();
    assert!(!link.system_inferred);
    assert_eq!(
        link.citation.as_ref().unwrap().quote,
        "I never learned to swim"
    );

    // both rejections are logged with their reasons
    let rejection_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM rejections WHERE session_id = ?1", [&sid], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(rejection_count, 2);
    let schema_reason: String = conn
        .query_row(
            "SELECT reason FROM rejections WHERE session_id = ?1 AND category = 'fears'",
            [&sid],
            |r| r.get(0),
        )
        .unwrap();
    assert!(schema_reason.contains("schema violation"));

    // the session is marked enriched and the audit log ends committed
    assert!(get_session(&conn, &sid).unwrap().unwrap().enriched_at.is_some());
    let last_state: String = conn
        .query_row(
            "SELECT state FROM enrichment_log WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
            [&sid],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(last_state, "committed");
}

#[tokio::test]
async fn rerun_is_a_no_op() {
    let mut conn = test_db();
    let config = test_config();
    let sid = seeded_session(&conn, &interview());

    enrich_session(&mut conn, &scripted(), &config, &NullIndexSink, &sid)
        .await
        .unwrap();
    let entities_before: i64 = conn
        .query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))
        .unwrap();

    let report = enrich_session(&mut conn, &scripted(), &config, &NullIndexSink, &sid)
        .await
        .unwrap();
    assert!(report.skipped);

    let entities_after: i64 = conn
        .query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))
        .unwrap();
    assert_eq!(entities_before, entities_after);
}

#[tokio::test]
async fn pass_failure_commits_nothing() {
    let mut conn = test_db();
    let config = test_config();
    let sid = seeded_session(&conn, &interview());

    let result = enrich_session(&mut conn, &FactualFailsService, &config, &NullIndexSink, &sid).await;
    let err = result.unwrap_err();
    assert!(matches!(err, EnrichError::PassService { .. }));
    assert!(err.is_retryable());

    // nothing written, session still pending
    let entities: i64 = conn
        .query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))
        .unwrap();
    assert_eq!(entities, 0);
    assert!(get_session(&conn, &sid).unwrap().unwrap().enriched_at.is_none());

    let last_state: String = conn
        .query_row(
            "SELECT state FROM enrichment_log WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
            [&sid],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(last_state, "failed");
}

#[tokio::test]
async fn retry_after_failure_commits_the_same_set_as_a_clean_run() {
    let config = test_config();

    // reference: the same responses against a fresh database
    let mut clean = test_db();
    let clean_sid = seeded_session(&clean, &interview());
    let clean_report = enrich_session(&mut clean, &scripted(), &config, &NullIndexSink, &clean_sid)
        .await
        .unwrap();

    // fail once, then retry with identical responses
    let mut conn = test_db();
    let sid = seeded_session(&conn, &interview());
    let err = enrich_session(&mut conn, &FactualFailsService, &config, &NullIndexSink, &sid)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let report = enrich_session(&mut conn, &scripted(), &config, &NullIndexSink, &sid)
        .await
        .unwrap();
    assert!(!report.skipped);
    assert_eq!(report.entities_created, clean_report.entities_created);
    assert_eq!(report.citations_added, clean_report.citations_added);
    assert_eq!(report.candidates_rejected, clean_report.candidates_rejected);

    let titles = |conn: &rusqlite::Connection| -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT title FROM entities ORDER BY title")
            .unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    };
    assert_eq!(titles(&conn), titles(&clean));
}

#[tokio::test]
async fn storage_failure_mid_commit_leaves_nothing_visible() {
    let mut conn = test_db();
    let config = test_config();
    let sid = seeded_session(&conn, &interview());

    // Passes and validation succeed, then the write set fails partway
    // through the transaction.
    conn.execute_batch("DROP TABLE rejections").unwrap();

    let result = enrich_session(&mut conn, &scripted(), &config, &NullIndexSink, &sid).await;
    assert!(matches!(result, Err(EnrichError::Commit(_))));

    // the entities inserted earlier in the transaction rolled back with it
    let entities: i64 = conn
        .query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))
        .unwrap();
    assert_eq!(entities, 0);
    assert!(get_session(&conn, &sid).unwrap().unwrap().enriched_at.is_none());
}

#[tokio::test]
async fn stalled_pass_times_out_and_fails_the_session() {
    let mut conn = test_db();
    let config = test_config(); // 1s pass timeout
    let sid = seeded_session(&conn, &interview());

    let result = enrich_session(&mut conn, &StalledService, &config, &NullIndexSink, &sid).await;
    assert!(matches!(result, Err(EnrichError::PassTimeout { .. })));
    assert!(get_session(&conn, &sid).unwrap().unwrap().enriched_at.is_none());
}

#[tokio::test]
async fn empty_pass_output_still_commits() {
    let mut conn = test_db();
    let config = test_config();
    let sid = seeded_session(&conn, &interview());

    let report = enrich_session(
        &mut conn,
        &ScriptedService::empty(),
        &config,
        &NullIndexSink,
        &sid,
    )
    .await
    .unwrap();
    assert_eq!(report.entities_created, 0);
    assert!(get_session(&conn, &sid).unwrap().unwrap().enriched_at.is_some());
}
