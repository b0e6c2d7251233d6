use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from a TOML file.
///
/// Every section has sensible defaults so `helpsync run` works with no
/// config file at all (credentials still come from the environment).
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub corpus: CorpusConfig,
    /// Remote object store for sync state and the run log. When absent,
    /// state is persisted to the local filesystem only (degraded mode).
    pub object_store: Option<ObjectStoreConfig>,
    pub index: IndexConfig,
}

/// Remote help-center listing source.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    /// Help-center subdomain, e.g. `acme` for `acme.zendesk.com`.
    pub subdomain: String,
    pub locale: String,
    /// Articles fetched per page (one page per run).
    pub page_size: usize,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            subdomain: "optisigns".to_string(),
            locale: "en-us".to_string(),
            page_size: 30,
            timeout_secs: 10,
        }
    }
}

/// Local document corpus layout.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory holding one markdown artifact per tracked article.
    pub articles_dir: PathBuf,
    /// Local sync-state file, used when no object store is configured and
    /// as the fallback read when the remote copy is unavailable.
    pub state_file: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            articles_dir: PathBuf::from("data/articles"),
            state_file: PathBuf::from("data/state.json"),
        }
    }
}

/// S3-compatible object store (AWS S3, DigitalOcean Spaces, MinIO).
///
/// Credentials are read from `SPACES_ACCESS_KEY_ID` /
/// `SPACES_SECRET_ACCESS_KEY`, falling back to the standard
/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services. When set, requests use
    /// path-style addressing (`endpoint/bucket/key`).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_state_key")]
    pub state_key: String,
    #[serde(default = "default_log_key")]
    pub log_key: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_state_key() -> String {
    "state/state.json".to_string()
}
fn default_log_key() -> String {
    "logs/run.log".to_string()
}

/// Remote vector store / assistant resources.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub store_name: String,
    pub assistant_name: String,
    pub model: String,
    /// System prompt for the assistant, bound to the vector store at
    /// creation time.
    pub instructions: String,
    /// Seconds between remote indexing status polls.
    pub poll_interval_secs: u64,
    /// Wall-clock ceiling for the indexing poll. Hitting it is reported
    /// but does not fail the run.
    pub poll_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            store_name: "Helpsync Articles".to_string(),
            assistant_name: "Helpsync Assistant".to_string(),
            model: "gpt-4o-mini".to_string(),
            instructions: default_instructions(),
            poll_interval_secs: 5,
            poll_timeout_secs: 300,
        }
    }
}

fn default_instructions() -> String {
    "You are a customer-support assistant.\n\
     • Tone: helpful, factual, concise.\n\
     • Only answer using the uploaded documentation.\n\
     • Keep responses to at most 5 bullet points; link to the full article for more.\n\
     • Always cite the source article URL (up to 3 per reply).\n\
     • If unsure, say so and suggest contacting support."
        .to_string()
}

/// Load configuration from `path`, falling back to built-in defaults when
/// the file does not exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("no config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate source
    if config.source.subdomain.is_empty() {
        anyhow::bail!("source.subdomain must not be empty");
    }
    if config.source.page_size == 0 || config.source.page_size > 100 {
        anyhow::bail!("source.page_size must be in 1..=100");
    }

    // Validate index polling
    if config.index.poll_interval_secs == 0 {
        anyhow::bail!("index.poll_interval_secs must be > 0");
    }
    if config.index.poll_timeout_secs < config.index.poll_interval_secs {
        anyhow::bail!("index.poll_timeout_secs must be >= index.poll_interval_secs");
    }

    // Validate object store
    if let Some(ref os) = config.object_store {
        if os.bucket.is_empty() {
            anyhow::bail!("object_store.bucket must not be empty");
        }
        if os.state_key.is_empty() {
            anyhow::bail!("object_store.state_key must not be empty");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_or_default(Path::new("/nonexistent/helpsync.toml")).unwrap();
        assert_eq!(config.source.page_size, 30);
        assert_eq!(config.source.locale, "en-us");
        assert!(config.object_store.is_none());
    }

    #[test]
    fn partial_file_backfills_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpsync.toml");
        std::fs::write(&path, "[source]\nsubdomain = \"acme\"\npage_size = 5\n").unwrap();
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.source.subdomain, "acme");
        assert_eq!(config.source.page_size, 5);
        // Untouched sections come from defaults.
        assert_eq!(config.index.poll_interval_secs, 5);
        assert_eq!(config.corpus.articles_dir, PathBuf::from("data/articles"));
    }

    #[test]
    fn page_size_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpsync.toml");
        std::fs::write(&path, "[source]\npage_size = 0\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn object_store_requires_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpsync.toml");
        std::fs::write(&path, "[object_store]\nbucket = \"\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
