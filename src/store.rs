//! Change ledger and sync-state persistence.
//!
//! `CorpusStore` owns the local artifact directory and the single persisted
//! [`SyncState`] object. It is the source of truth for "did this article
//! change": classification compares the fingerprint of freshly normalized
//! content against the ledger, never timestamps.
//!
//! State is loaded once at open (remote object store preferred, local file
//! as fallback) and persisted at explicit checkpoints: cursor advance,
//! resource-id assignment, and run finalization. There is no cross-process
//! locking on the remote object; callers must schedule runs single-flight.
//!
//! Invariants maintained here:
//! - a ledger record exists iff its artifact file exists (a slug change on
//!   update deletes the old artifact; reset clears both sides together);
//! - a record's fingerprint always matches the normalized body most
//!   recently written under its slug.

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{Article, ArticleRecord, Classification, SyncState};
use crate::spaces::SpacesClient;

/// Content fingerprint: hex SHA-256 of the normalized body.
///
/// Change detection only; no integrity or security claim.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a filesystem-safe slug from a title: lowercase alphanumeric runs
/// joined by `-`, truncated to `max_length`.
pub fn slugify(text: &str, max_length: usize) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.len() > max_length {
        slug.truncate(max_length);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Local corpus + persisted sync state.
pub struct CorpusStore {
    articles_dir: PathBuf,
    state_file: PathBuf,
    spaces: Option<SpacesClient>,
    state_key: String,
    log_key: String,
    state: SyncState,
}

impl CorpusStore {
    /// Open the store: create directories, connect the object store when
    /// configured, and load the most recent state (remote preferred).
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.corpus.articles_dir).with_context(|| {
            format!(
                "Failed to create articles directory: {}",
                config.corpus.articles_dir.display()
            )
        })?;
        if let Some(parent) = config.corpus.state_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (spaces, state_key, log_key) = match &config.object_store {
            Some(os) => match SpacesClient::new(os.clone()) {
                Ok(client) => {
                    info!(
                        bucket = %os.bucket,
                        key = %os.state_key,
                        "object store enabled for state sync"
                    );
                    (Some(client), os.state_key.clone(), os.log_key.clone())
                }
                Err(e) => {
                    warn!("object store disabled (init failed), running degraded: {e:#}");
                    (None, os.state_key.clone(), os.log_key.clone())
                }
            },
            None => (None, String::new(), String::new()),
        };

        let state = load_state(spaces.as_ref(), &state_key, &config.corpus.state_file);

        Ok(Self {
            articles_dir: config.corpus.articles_dir.clone(),
            state_file: config.corpus.state_file.clone(),
            spaces,
            state_key,
            log_key,
            state,
        })
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn articles_dir(&self) -> &Path {
        &self.articles_dir
    }

    pub fn artifact_path(&self, slug: &str) -> PathBuf {
        self.articles_dir.join(format!("{}.md", slug))
    }

    // ── Pagination cursor ────────────────────────────────────────────

    pub fn cursor(&self) -> Option<String> {
        self.state.cursor.clone()
    }

    /// Store the continuation cursor and persist immediately, so a crash
    /// mid-batch does not re-fetch the same page on the next run.
    pub fn set_cursor(&mut self, cursor: Option<String>) -> Result<()> {
        self.state.cursor = cursor;
        self.save()
    }

    // ── Remote resource ids ──────────────────────────────────────────

    pub fn vector_store_id(&self) -> Option<String> {
        self.state.vector_store_id.clone()
    }

    pub fn set_vector_store_id(&mut self, id: String) -> Result<()> {
        self.state.vector_store_id = Some(id);
        self.save()
    }

    pub fn assistant_id(&self) -> Option<String> {
        self.state.assistant_id.clone()
    }

    pub fn set_assistant_id(&mut self, id: String) -> Result<()> {
        self.state.assistant_id = Some(id);
        self.save()
    }

    // ── Change ledger ────────────────────────────────────────────────

    /// Classify freshly fetched content against the ledger. Pure; no side
    /// effects.
    pub fn classify(&self, remote_id: u64, new_fingerprint: &str) -> Classification {
        match self.state.articles.get(&remote_id.to_string()) {
            None => Classification::New,
            Some(record) if record.fingerprint != new_fingerprint => Classification::Updated,
            Some(_) => Classification::Unchanged,
        }
    }

    /// Persist the artifact for `article` and upsert its ledger record.
    ///
    /// Artifact-first write order: a crash after the artifact write but
    /// before state persistence self-heals on the next run, because the
    /// fingerprint is recomputed from re-fetched content rather than read
    /// back from disk.
    pub fn record(&mut self, article: &Article, normalized_body: &str) -> Result<String> {
        let slug = self.derive_slug(&article.title, article.id);
        let path = self.artifact_path(&slug);

        let artifact = format!(
            "# {}\n\n**Source:** [{url}]({url})\n**Last Updated:** {}\n\n---\n\n{}",
            article.title,
            article.updated_at,
            normalized_body,
            url = article.html_url,
        );
        fs::write(&path, artifact)
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;

        let key = article.id.to_string();

        // A title change can move the slug; drop the superseded artifact so
        // the ledger and the directory stay in one-to-one correspondence.
        if let Some(old) = self.state.articles.get(&key) {
            if old.slug != slug {
                let old_path = self.artifact_path(&old.slug);
                if let Err(e) = fs::remove_file(&old_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %old_path.display(), "could not remove superseded artifact: {e}");
                    }
                }
            }
        }

        self.state.articles.insert(
            key,
            ArticleRecord {
                title: article.title.clone(),
                slug: slug.clone(),
                fingerprint: fingerprint(normalized_body),
                remote_updated_at: article.updated_at.clone(),
                saved_at: Utc::now(),
                source_url: article.html_url.clone(),
            },
        );

        info!(slug = %slug, "saved artifact");
        Ok(slug)
    }

    /// Slug for a title, with a `article-{id}` fallback for titles that
    /// slugify to nothing and an `-{id}` suffix when another tracked
    /// article already owns the derived slug.
    fn derive_slug(&self, title: &str, remote_id: u64) -> String {
        let mut slug = slugify(title, 100);
        if slug.is_empty() {
            slug = format!("article-{}", remote_id);
        }
        let key = remote_id.to_string();
        let taken = self
            .state
            .articles
            .iter()
            .any(|(id, record)| *id != key && record.slug == slug);
        if taken {
            slug = format!("{}-{}", slug, remote_id);
        }
        slug
    }

    // ── State lifecycle ──────────────────────────────────────────────

    /// Persist the state object: to the object store when enabled, to the
    /// local state file otherwise. A failure here is fatal to the caller —
    /// in-memory changes do not count until they are durable.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        match &self.spaces {
            Some(client) => client
                .upload(&self.state_key, json.as_bytes(), "application/json")
                .context("Failed to persist sync state to object store")?,
            None => fs::write(&self.state_file, &json).with_context(|| {
                format!("Failed to persist sync state: {}", self.state_file.display())
            })?,
        }
        Ok(())
    }

    /// Run finalization: refresh metadata and persist once.
    pub fn finalize(&mut self) -> Result<()> {
        self.state.last_run = Some(Utc::now());
        self.state.total_articles = self.state.articles.len();
        self.save()?;
        info!(total = self.state.total_articles, "state finalized");
        Ok(())
    }

    /// Clear ledger, cursor, and resource ids together with all local
    /// artifacts and the persisted state object.
    pub fn reset(&mut self) -> Result<()> {
        for entry in WalkDir::new(&self.articles_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().map(|ext| ext == "md").unwrap_or(false) {
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), "could not remove artifact: {e}");
                }
            }
        }

        self.state = SyncState::default();

        if let Some(client) = &self.spaces {
            if let Err(e) = client.delete(&self.state_key) {
                warn!("could not delete remote state object: {e:#}");
            }
        }
        if let Err(e) = fs::remove_file(&self.state_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e).with_context(|| {
                    format!("Failed to remove state file: {}", self.state_file.display())
                });
            }
        }

        info!("sync state reset");
        Ok(())
    }

    /// Append one line to the remote run log. Best-effort; the run log is
    /// auxiliary and never fails a run.
    pub fn append_run_log(&self, line: &str) {
        if let Some(client) = &self.spaces {
            if let Err(e) = client.append(&self.log_key, line) {
                warn!("run-log append failed: {e:#}");
            }
        }
    }
}

fn load_state(spaces: Option<&SpacesClient>, state_key: &str, state_file: &Path) -> SyncState {
    if let Some(client) = spaces {
        match client.download(state_key) {
            Ok(Some(text)) => match serde_json::from_str(&text) {
                Ok(state) => {
                    info!(key = state_key, "loaded state from object store");
                    return state;
                }
                Err(e) => warn!("remote state unreadable, trying local fallback: {e}"),
            },
            Ok(None) => info!("no remote state object, trying local fallback"),
            Err(e) => warn!("remote state fetch failed, degraded to local fallback: {e:#}"),
        }
    }

    if state_file.exists() {
        match fs::read_to_string(state_file)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from))
        {
            Ok(state) => {
                info!(path = %state_file.display(), "loaded state from local file");
                return state;
            }
            Err(e) => warn!("could not load local state file: {e}"),
        }
    }

    info!("no existing state found, starting fresh");
    SyncState::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_store() -> (tempfile::TempDir, CorpusStore) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.corpus.articles_dir = tmp.path().join("articles");
        config.corpus.state_file = tmp.path().join("state.json");
        let store = CorpusStore::open(&config).unwrap();
        (tmp, store)
    }

    fn article(id: u64, title: &str) -> Article {
        Article {
            id,
            title: title.to_string(),
            body: Some("<p>ignored</p>".to_string()),
            html_url: format!("https://support.example.com/articles/{}", id),
            updated_at: "2025-06-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn slugify_basics() {
        assert_eq!(slugify("Hello, World!", 100), "hello-world");
        assert_eq!(slugify("  Setup & Install  ", 100), "setup-install");
        assert_eq!(slugify("™☃", 100), "");
    }

    #[test]
    fn slugify_truncates_without_trailing_dash() {
        let slug = slugify("aaaa bbbb cccc", 9);
        assert_eq!(slug, "aaaa-bbbb");
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn classify_new_then_unchanged_roundtrip() {
        let (_tmp, mut store) = test_store();
        let body = "Normalized body text.";
        let fp = fingerprint(body);

        assert_eq!(store.classify(1, &fp), Classification::New);
        store.record(&article(1, "Getting Started"), body).unwrap();
        // record followed by classify on the same content is Unchanged.
        assert_eq!(store.classify(1, &fp), Classification::Unchanged);
        assert_eq!(store.classify(1, &fingerprint("other")), Classification::Updated);
    }

    #[test]
    fn record_writes_artifact_with_header() {
        let (_tmp, mut store) = test_store();
        let slug = store.record(&article(7, "Install the Player"), "Body.").unwrap();
        assert_eq!(slug, "install-the-player");

        let content = fs::read_to_string(store.artifact_path(&slug)).unwrap();
        assert!(content.starts_with("# Install the Player\n"));
        assert!(content.contains("**Source:** [https://support.example.com/articles/7]"));
        assert!(content.contains("**Last Updated:** 2025-06-01T12:00:00Z"));
        assert!(content.ends_with("---\n\nBody."));
    }

    #[test]
    fn empty_slug_falls_back_to_article_id() {
        let (_tmp, mut store) = test_store();
        let slug = store.record(&article(99, "™☃"), "Body.").unwrap();
        assert_eq!(slug, "article-99");
    }

    #[test]
    fn slug_collision_gets_disambiguating_suffix() {
        let (_tmp, mut store) = test_store();
        let first = store.record(&article(1, "Duplicate Title"), "one").unwrap();
        let second = store.record(&article(2, "Duplicate Title"), "two").unwrap();
        assert_eq!(first, "duplicate-title");
        assert_eq!(second, "duplicate-title-2");
        assert!(store.artifact_path(&first).exists());
        assert!(store.artifact_path(&second).exists());
    }

    #[test]
    fn slug_is_stable_across_updates() {
        let (_tmp, mut store) = test_store();
        let first = store.record(&article(1, "Stable Title"), "v1").unwrap();
        let second = store.record(&article(1, "Stable Title"), "v2").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn title_change_removes_superseded_artifact() {
        let (_tmp, mut store) = test_store();
        let old_slug = store.record(&article(1, "Old Title"), "body").unwrap();
        let new_slug = store.record(&article(1, "New Title"), "body").unwrap();
        assert_ne!(old_slug, new_slug);
        assert!(!store.artifact_path(&old_slug).exists());
        assert!(store.artifact_path(&new_slug).exists());
    }

    #[test]
    fn state_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.corpus.articles_dir = tmp.path().join("articles");
        config.corpus.state_file = tmp.path().join("state.json");

        {
            let mut store = CorpusStore::open(&config).unwrap();
            store.record(&article(1, "Persisted"), "body").unwrap();
            store.set_cursor(Some("https://example.test/page=2".to_string())).unwrap();
            store.set_vector_store_id("vs_123".to_string()).unwrap();
            store.finalize().unwrap();
        }

        let store = CorpusStore::open(&config).unwrap();
        assert_eq!(store.cursor().as_deref(), Some("https://example.test/page=2"));
        assert_eq!(store.vector_store_id().as_deref(), Some("vs_123"));
        assert_eq!(store.state().articles.len(), 1);
        assert_eq!(store.state().total_articles, 1);
        assert!(store.state().last_run.is_some());
    }

    #[test]
    fn reset_clears_state_and_artifacts() {
        let (_tmp, mut store) = test_store();
        let slug = store.record(&article(1, "Doomed"), "body").unwrap();
        store.set_cursor(Some("cursor".to_string())).unwrap();
        store.set_assistant_id("asst_1".to_string()).unwrap();

        store.reset().unwrap();

        assert!(store.state().articles.is_empty());
        assert!(store.cursor().is_none());
        assert!(store.vector_store_id().is_none());
        assert!(store.assistant_id().is_none());
        assert!(!store.artifact_path(&slug).exists());
    }
}
