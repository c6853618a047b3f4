#![allow(dead_code)]

use chronicle::config::ChronicleConfig;
use chronicle::extract::ReasoningService;
use chronicle::transcript::{self, Speaker};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    chronicle::db::open_memory_database().unwrap()
}

/// Default config with a fixed subject name and a short pass timeout.
pub fn test_config() -> ChronicleConfig {
    let mut config = ChronicleConfig::default();
    config.app.subject_name = "Margaret".to_string();
    config.extraction.timeout_secs = 1;
    config
}

/// Create a completed session from (speaker, text) pairs. Returns its ID.
pub fn seeded_session(conn: &Connection, turns: &[(Speaker, &str)]) -> String {
    let session_id = transcript::create_session(conn).unwrap();
    for (speaker, text) in turns {
        transcript::append_turn(conn, &session_id, *speaker, text).unwrap();
    }
    transcript::complete_session(conn, &session_id).unwrap();
    session_id
}

/// Build one response entry in the wire format the passes emit.
pub fn entry(category: &str, title: &str, fields: Value, turn: u32, quote: &str) -> Value {
    json!({
        "category": category,
        "title": title,
        "fields": fields,
        "evidence_type": "direct_statement",
        "citations": [{ "turn": turn, "quote": quote }]
    })
}

/// Wrap entries (and optionally connections) as a full pass response.
pub fn response(entries: Vec<Value>, connections: Vec<Value>) -> String {
    json!({ "entries": entries, "connections": connections }).to_string()
}

/// A reasoning service that replays canned responses. The pass is recognized
/// from its prompt preamble.
pub struct ScriptedService {
    pub factual: String,
    pub emotional: String,
    pub analytical: String,
}

impl ScriptedService {
    /// All three passes return empty output.
    pub fn empty() -> Self {
        Self {
            factual: response(vec![], vec![]),
            emotional: response(vec![], vec![]),
            analytical: response(vec![], vec![]),
        }
    }
}

impl ReasoningService for ScriptedService {
    async fn complete(&self, _model: &str, prompt: &str, _max_tokens: u32) -> anyhow::Result<String> {
        if prompt.contains("captures FACTS") {
            Ok(self.factual.clone())
        } else if prompt.contains("captures FEELINGS") {
            Ok(self.emotional.clone())
        } else if prompt.contains("captures PATTERNS") {
            Ok(self.analytical.clone())
        } else {
            anyhow::bail!("unrecognized prompt")
        }
    }
}

/// A service whose factual pass fails; the other passes succeed.
pub struct FactualFailsService;

impl ReasoningService for FactualFailsService {
    async fn complete(&self, _model: &str, prompt: &str, _max_tokens: u32) -> anyhow::Result<String> {
        if prompt.contains("captures FACTS") {
            anyhow::bail!("service unavailable")
        }
        Ok(response(vec![], vec![]))
    }
}

/// A service that never responds, for timeout tests.
pub struct StalledService;

impl ReasoningService for StalledService {
    async fn complete(&self, _model: &str, _prompt: &str, _max_tokens: u32) -> anyhow::Result<String> {
        std::future::pending().await
    }
}
