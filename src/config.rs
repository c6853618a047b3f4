use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChronicleConfig {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub extraction: ExtractionConfig,
    pub grounding: GroundingConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    /// Name of the interview subject, interpolated into pass prompts.
    pub subject_name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Endpoint of the reasoning service (messages-style JSON API).
    pub service_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model used for the exhaustive factual pass.
    pub factual_model: String,
    /// Model used for the emotional and analytical passes.
    pub reflective_model: String,
    pub max_tokens: u32,
    /// Per-pass call timeout. On expiry the whole session enrichment fails;
    /// partial pass coverage is never committed.
    pub timeout_secs: u64,
    /// How many recent entity titles per category are included as prior context.
    pub prior_context_per_category: usize,
}

/// Citation repair tolerance. A failed exact match is trimmed to the longest
/// matching contiguous token span; the repair is accepted only if it keeps at
/// least `repair_min_tokens` tokens and `repair_min_ratio` of the quote.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GroundingConfig {
    pub repair_min_tokens: usize,
    pub repair_min_ratio: f64,
}

/// Merge policy parameters. Scores are Jaro-Winkler over normalized key text.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MergeConfig {
    /// At or above this score the candidate is the same underlying entity
    /// (boundary is inclusive).
    pub merge_threshold: f64,
    /// At or above this (but below merge) the candidate is distinct but gets a
    /// `related_to` cross-reference.
    pub related_threshold: f64,
    /// Scores within this margin below `merge_threshold` insert as new but are
    /// flagged for human review instead of auto-merging.
    pub ambiguity_margin: f64,
}

impl Default for ChronicleConfig {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            storage: StorageConfig::default(),
            extraction: ExtractionConfig::default(),
            grounding: GroundingConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            subject_name: "the subject".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_chronicle_dir()
            .join("chronicle.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            service_url: "https://api.anthropic.com/v1/messages".into(),
            api_key_env: "CHRONICLE_API_KEY".into(),
            factual_model: "claude-opus-4-20250514".into(),
            reflective_model: "claude-sonnet-4-20250514".into(),
            max_tokens: 16000,
            timeout_secs: 120,
            prior_context_per_category: 25,
        }
    }
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            repair_min_tokens: 3,
            repair_min_ratio: 0.6,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.90,
            related_threshold: 0.75,
            ambiguity_margin: 0.04,
        }
    }
}

/// Returns `~/.chronicle/`
pub fn default_chronicle_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".chronicle")
}

/// Returns the default config file path: `~/.chronicle/config.toml`
pub fn default_config_path() -> PathBuf {
    default_chronicle_dir().join("config.toml")
}

impl ChronicleConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ChronicleConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (CHRONICLE_DB, CHRONICLE_SUBJECT, CHRONICLE_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHRONICLE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("CHRONICLE_SUBJECT") {
            self.app.subject_name = val;
        }
        if let Ok(val) = std::env::var("CHRONICLE_LOG_LEVEL") {
            self.app.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Read the reasoning-service API key from the configured env var.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.extraction.api_key_env).with_context(|| {
            format!(
                "reasoning service API key not set: {}",
                self.extraction.api_key_env
            )
        })
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ChronicleConfig::default();
        assert_eq!(config.app.log_level, "info");
        assert!(config.storage.db_path.ends_with("chronicle.db"));
        assert_eq!(config.merge.merge_threshold, 0.90);
        assert!(config.merge.related_threshold < config.merge.merge_threshold);
        assert_eq!(config.extraction.timeout_secs, 120);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[app]
log_level = "debug"
subject_name = "Bill"

[storage]
db_path = "/tmp/test.db"

[merge]
merge_threshold = 0.85
"#;
        let config: ChronicleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.app.log_level, "debug");
        assert_eq!(config.app.subject_name, "Bill");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.merge.merge_threshold, 0.85);
        // defaults still apply for unset fields
        assert_eq!(config.merge.related_threshold, 0.75);
        assert_eq!(config.grounding.repair_min_tokens, 3);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ChronicleConfig::default();
        std::env::set_var("CHRONICLE_DB", "/tmp/override.db");
        std::env::set_var("CHRONICLE_SUBJECT", "Ada");
        std::env::set_var("CHRONICLE_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.app.subject_name, "Ada");
        assert_eq!(config.app.log_level, "trace");

        std::env::remove_var("CHRONICLE_DB");
        std::env::remove_var("CHRONICLE_SUBJECT");
        std::env::remove_var("CHRONICLE_LOG_LEVEL");
    }

    #[test]
    fn api_key_reads_the_configured_env_var() {
        let mut config = ChronicleConfig::default();
        config.extraction.api_key_env = "CHRONICLE_TEST_API_KEY".to_string();

        assert!(config.api_key().is_err());

        std::env::set_var("CHRONICLE_TEST_API_KEY", "sk-test");
        assert_eq!(config.api_key().unwrap(), "sk-test");
        std::env::remove_var("CHRONICLE_TEST_API_KEY");
    }
}
