pub mod enrich;
pub mod export;
pub mod inspect;
pub mod session;
pub mod stats;
