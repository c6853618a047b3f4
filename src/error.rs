//! Error taxonomy for the enrichment pipeline.
//!
//! Per-candidate failures ([`EnrichError::Grounding`], [`EnrichError::SchemaViolation`])
//! are recovered locally — the candidate is dropped and logged, the session continues.
//! Per-pass failures ([`EnrichError::PassTimeout`], [`EnrichError::PassService`]) and
//! commit failures fail the whole session; both are retryable since the transcript is
//! immutable and nothing was durably written.

use thiserror::Error;

use crate::registry::Pass;

#[derive(Debug, Error)]
pub enum EnrichError {
    /// A citation could not be verified against its turn, even after repair.
    /// Local: the candidate is dropped and logged, the session continues.
    #[error("ungrounded citation: {reason}")]
    Grounding { reason: String },

    /// A pass call exceeded its configured timeout. Session-fatal, retryable.
    #[error("{pass} pass timed out after {seconds}s")]
    PassTimeout { pass: Pass, seconds: u64 },

    /// The reasoning service returned an error or an unparseable response.
    /// Session-fatal, retryable. Malformed output is never partial success.
    #[error("{pass} pass service error: {message}")]
    PassService { pass: Pass, message: String },

    /// Pass output did not match its category schema (unknown category, wrong
    /// owning pass, missing required fields). Local: candidate dropped and logged.
    #[error("schema violation: {reason}")]
    SchemaViolation { reason: String },

    /// The commit transaction failed. The session reverts to pending; no
    /// partial state is visible.
    #[error("commit failed: {0}")]
    Commit(#[from] anyhow::Error),

    /// The session is not in a state that permits the requested operation
    /// (e.g. enriching a session that is still active).
    #[error("invalid session state: {0}")]
    SessionState(String),
}

impl EnrichError {
    /// `true` if this error drops a single candidate without failing the session.
    pub fn is_candidate_local(&self) -> bool {
        matches!(self, Self::Grounding { .. } | Self::SchemaViolation { .. })
    }

    /// `true` if a failed session may be re-run from pending.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PassTimeout { .. } | Self::PassService { .. } | Self::Commit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_local_errors_are_not_session_fatal() {
        let schema = EnrichError::SchemaViolation {
            reason: "missing title".to_string(),
        };
        assert!(schema.is_candidate_local());
        assert!(!schema.is_retryable());
        assert!(schema.to_string().contains("schema violation"));

        let grounding = EnrichError::Grounding {
            reason: "quote not found".to_string(),
        };
        assert!(grounding.is_candidate_local());

        let timeout = EnrichError::PassTimeout {
            pass: Pass::Factual,
            seconds: 120,
        };
        assert!(!timeout.is_candidate_local());
        assert!(timeout.is_retryable());
    }
}
