//! Transcript store — sessions and their verbatim turns.
//!
//! Sessions are append-only while `active` and immutable once `completed`.
//! Turns are never edited or deleted; they are the ground truth every
//! citation resolves against.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("unknown session status: {s}")),
        }
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Interviewer,
    Subject,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interviewer => "interviewer",
            Self::Subject => "subject",
        }
    }
}

impl std::str::FromStr for Speaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interviewer" => Ok(Self::Interviewer),
            "subject" => Ok(Self::Subject),
            _ => Err(format!("unknown speaker: {s}")),
        }
    }
}

/// One bounded conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub status: SessionStatus,
    /// ISO 8601 start timestamp.
    pub started_at: String,
    /// ISO 8601 end timestamp, set when completed or abandoned.
    pub ended_at: Option<String>,
    /// Set exactly once, when enrichment commits.
    pub enriched_at: Option<String>,
}

/// One utterance exchange, immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    /// 0-based position within the session.
    pub seq: u32,
    pub speaker: Speaker,
    pub text: String,
    pub created_at: String,
}

/// Create a new active session. Returns its ID.
pub fn create_session(conn: &Connection) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO sessions (id, status, started_at) VALUES (?1, 'active', ?2)",
        params![id, now],
    )?;
    Ok(id)
}

/// Append a turn to an active session. Fails if the session is finalized.
pub fn append_turn(
    conn: &Connection,
    session_id: &str,
    speaker: Speaker,
    text: &str,
) -> Result<Turn> {
    let session = get_session(conn, session_id)?
        .ok_or_else(|| anyhow::anyhow!("session not found: {session_id}"))?;
    if session.status != SessionStatus::Active {
        bail!("cannot append to {} session {session_id}", session.status);
    }

    let seq: u32 = conn.query_row(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM turns WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;

    let turn = Turn {
        id: uuid::Uuid::now_v7().to_string(),
        session_id: session_id.to_string(),
        seq,
        speaker,
        text: text.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    conn.execute(
        "INSERT INTO turns (id, session_id, seq, speaker, text, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            turn.id,
            turn.session_id,
            turn.seq,
            turn.speaker.as_str(),
            turn.text,
            turn.created_at
        ],
    )?;

    Ok(turn)
}

/// Finalize a session. After this the transcript is immutable and the session
/// is eligible for enrichment.
pub fn complete_session(conn: &Connection, session_id: &str) -> Result<()> {
    finalize(conn, session_id, SessionStatus::Completed)
}

/// Mark a session abandoned. Abandoned sessions are never enriched.
pub fn abandon_session(conn: &Connection, session_id: &str) -> Result<()> {
    finalize(conn, session_id, SessionStatus::Abandoned)
}

fn finalize(conn: &Connection, session_id: &str, status: SessionStatus) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn.execute(
        "UPDATE sessions SET status = ?1, ended_at = ?2 \
         WHERE id = ?3 AND status = 'active'",
        params![status.as_str(), now, session_id],
    )?;
    if rows == 0 {
        bail!("session not found or already finalized: {session_id}");
    }
    Ok(())
}

/// Fetch a session by ID.
pub fn get_session(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT id, status, started_at, ended_at, enriched_at \
             FROM sessions WHERE id = ?1",
            params![session_id],
            row_to_session,
        )
        .optional()?;
    Ok(session)
}

/// All sessions, oldest first.
pub fn list_sessions(conn: &Connection) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, status, started_at, ended_at, enriched_at \
         FROM sessions ORDER BY started_at",
    )?;
    let sessions = stmt
        .query_map([], row_to_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

/// Completed sessions that have not yet been enriched.
pub fn pending_sessions(conn: &Connection) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, status, started_at, ended_at, enriched_at FROM sessions \
         WHERE status = 'completed' AND enriched_at IS NULL ORDER BY started_at",
    )?;
    let sessions = stmt
        .query_map([], row_to_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

/// The full ordered turn sequence of a session.
pub fn session_turns(conn: &Connection, session_id: &str) -> Result<Vec<Turn>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, seq, speaker, text, created_at \
         FROM turns WHERE session_id = ?1 ORDER BY seq",
    )?;
    let turns = stmt
        .query_map(params![session_id], |row| {
            let speaker: String = row.get(3)?;
            Ok(Turn {
                id: row.get(0)?,
                session_id: row.get(1)?,
                seq: row.get(2)?,
                speaker: speaker.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
                text: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(turns)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(1)?;
    Ok(Session {
        id: row.get(0)?,
        status: status.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        enriched_at: row.get(4)?,
    })
}
