//! Chronicle — a biographical knowledge base built from interview
//! transcripts.
//!
//! Interview sessions are recorded verbatim, then enriched: three concurrent
//! extraction passes (factual, emotional, analytical) propose structured
//! entities, every claim is validated against the transcript it cites,
//! repeat mentions are merged across sessions, and typed cross-references
//! connect the result into a navigable record of one person's life.
//!
//! The load-bearing rule is provenance: no entity exists without a verbatim
//! quote from a transcript turn backing it.

pub mod cli;
pub mod config;
pub mod crossref;
pub mod db;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod grounding;
pub mod index;
pub mod merge;
pub mod registry;
pub mod store;
pub mod transcript;
