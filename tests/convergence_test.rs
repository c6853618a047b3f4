//! Cross-session convergence: repeat mentions merge, conflicting revisions
//! supersede, and citations accumulate instead of duplicating.

mod helpers;

use chronicle::enrich::enrich_session;
use chronicle::index::NullIndexSink;
use chronicle::registry::Category;
use chronicle::store;
use chronicle::transcript::Speaker;
use helpers::*;
use serde_json::json;

fn factual_only(entries: Vec<serde_json::Value>) -> ScriptedService {
    ScriptedService {
        factual: response(entries, vec![]),
        emotional: response(vec![], vec![]),
        analytical: response(vec![], vec![]),
    }
}

#[tokio::test]
async fn repeat_mention_converges_onto_one_entity() {
    let mut conn = test_db();
    let config = test_config();

    // Session 1: "my father"
    let s1 = seeded_session(
        &conn,
        &[(Speaker::Subject, "My father taught me to fish on Lake Erie.")],
    );
    let svc1 = factual_only(vec![entry(
        "relationships",
        "Father",
        json!({ "person_name": "Father", "relation": "father", "emotional_tone": "distant" }),
        0,
        "My father taught me to fish",
    )]);
    enrich_session(&mut conn, &svc1, &config, &NullIndexSink, &s1)
        .await
        .unwrap();

    // Session 2: "Dad", warmer
    let s2 = seeded_session(
        &conn,
        &[(Speaker::Subject, "Dad mellowed a lot in his last years.")],
    );
    let svc2 = factual_only(vec![entry(
        "relationships",
        "Dad",
        json!({ "person_name": "Dad", "relation": "father", "emotional_tone": "warm" }),
        0,
        "Dad mellowed a lot",
    )]);
    let report = enrich_session(&mut conn, &svc2, &config, &NullIndexSink, &s2)
        .await
        .unwrap();
    assert_eq!(report.entities_created, 0);
    assert_eq!(report.entities_augmented, 1);

    // one entity, citations from both sessions, refined tone
    let people = store::active_entities(&conn, Category::Relationships).unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].fields["emotional_tone"], json!("warm"));
    assert_eq!(people[0].fields["relation"], json!("father"));

    let citations = store::entity_citations(&conn, &people[0].id).unwrap();
    assert_eq!(citations.len(), 2);
    let sessions: Vec<&str> = citations.iter().map(|c| c.session_id.as_str()).collect();
    assert!(sessions.contains(&s1.as_str()));
    assert!(sessions.contains(&s2.as_str()));
}

#[tokio::test]
async fn conflicting_revision_supersedes() {
    let mut conn = test_db();
    let config = test_config();

    let s1 = seeded_session(
        &conn,
        &[(Speaker::Subject, "My father taught me to fish on Lake Erie.")],
    );
    let svc1 = factual_only(vec![entry(
        "relationships",
        "Father",
        json!({ "person_name": "Father", "relation": "father" }),
        0,
        "My father taught me to fish",
    )]);
    enrich_session(&mut conn, &svc1, &config, &NullIndexSink, &s1)
        .await
        .unwrap();

    // Later session corrects the relation, a non-refinable field.
    let s2 = seeded_session(
        &conn,
        &[(Speaker::Subject, "Actually he was my stepfather, not my father.")],
    );
    let svc2 = factual_only(vec![entry(
        "relationships",
        "Father",
        json!({ "person_name": "Father", "relation": "stepfather" }),
        0,
        "he was my stepfather",
    )]);
    let report = enrich_session(&mut conn, &svc2, &config, &NullIndexSink, &s2)
        .await
        .unwrap();
    assert_eq!(report.entities_superseded, 1);

    let active = store::active_entities(&conn, Category::Relationships).unwrap();
    assert_eq!(active.len(), 1);
    let current = &active[0];
    assert_eq!(current.fields["relation"], json!("stepfather"));
    assert!(current.superseded_by.is_none());

    // replacement carries both citation sets
    let citations = store::entity_citations(&conn, &current.id).unwrap();
    assert_eq!(citations.len(), 2);

    // the old version is retained, marked superseded
    let superseded: Vec<(String, Option<String>)> = conn
        .prepare("SELECT id, superseded_by FROM entities WHERE superseded_by IS NOT NULL")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(superseded.len(), 1);
    assert_eq!(superseded[0].1.as_deref(), Some(current.id.as_str()));
}

#[tokio::test]
async fn mentions_of_known_people_are_linked() {
    let mut conn = test_db();
    let config = test_config();

    let s1 = seeded_session(
        &conn,
        &[(Speaker::Subject, "My father taught me to fish on Lake Erie.")],
    );
    let svc1 = factual_only(vec![entry(
        "relationships",
        "Father",
        json!({ "person_name": "Father" }),
        0,
        "My father taught me to fish",
    )]);
    enrich_session(&mut conn, &svc1, &config, &NullIndexSink, &s1)
        .await
        .unwrap();

    let s2 = seeded_session(
        &conn,
        &[(Speaker::Subject, "Dad mellowed a lot in his last years.")],
    );
    let svc2 = factual_only(vec![entry(
        "stories",
        "Fishing with Dad",
        json!({ "point_or_lesson": "patience" }),
        0,
        "Dad mellowed a lot",
    )]);
    enrich_session(&mut conn, &svc2, &config, &NullIndexSink, &s2)
        .await
        .unwrap();

    let people = store::active_entities(&conn, Category::Relationships).unwrap();
    let stories = store::active_entities(&conn, Category::Stories).unwrap();
    assert_eq!(stories.len(), 1);

    let links = store::entity_cross_references(&conn, &stories[0].id).unwrap();
    let link = links.iter().find(|l| l.kind == "involves_person").unwrap();
    assert_eq!(link.target_id, people[0].id);
    assert!(link.system_inferred);
    assert!(link.citation.is_none());
}
