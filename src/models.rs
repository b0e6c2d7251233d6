//! Core data types used throughout helpsync.
//!
//! These types represent the article metadata flowing in from the remote
//! listing, the per-article ledger records, the single persisted sync state
//! object, and the summaries returned by a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry from a help-center listing page.
///
/// All fields are required: a listing response missing any of them is a
/// protocol mismatch and fails deserialization (and therefore the run).
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleMeta {
    pub id: u64,
    pub title: String,
    pub html_url: String,
    /// Source-reported last-modified timestamp, kept verbatim. Not used as
    /// the change signal (the content fingerprint is authoritative).
    pub updated_at: String,
}

/// A full article as returned by the per-article content fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    /// Raw HTML body. Absent or empty bodies are skipped by the engine.
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    pub updated_at: String,
}

/// Ledger entry for one tracked article, keyed by its remote id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    /// Filesystem-safe identifier derived from the title; unique among
    /// currently tracked articles.
    pub slug: String,
    /// Hex SHA-256 of the normalized body. The change-detection signal.
    pub fingerprint: String,
    pub remote_updated_at: String,
    pub saved_at: DateTime<Utc>,
    pub source_url: String,
}

/// The single persisted sync-state object.
///
/// Every field carries a serde default so that state written by an older
/// version loads cleanly: missing fields are backfilled rather than
/// rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Opaque pagination cursor (the listing's `next_page` URL). Absent
    /// means "start of listing".
    #[serde(default)]
    pub cursor: Option<String>,
    /// Ledger: remote article id (stringified) → record.
    #[serde(default)]
    pub articles: BTreeMap<String, ArticleRecord>,
    #[serde(default)]
    pub vector_store_id: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_articles: usize,
}

/// Outcome of classifying a fetched article against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No record exists for this remote id.
    New,
    /// A record exists with a different fingerprint.
    Updated,
    /// A record exists with the same fingerprint.
    Unchanged,
}

/// Summary of one sync run (one page-batch).
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_fetched: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Slugs of articles added or updated in this run; the only items
    /// forwarded to publishing.
    pub changed_slugs: Vec<String>,
    /// True when the listing returned no continuation cursor, i.e. this
    /// batch completed a full pagination cycle.
    pub pagination_complete: bool,
}

/// Remote processing counts reported by the vector store.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub cancelled: u64,
    #[serde(default)]
    pub total: u64,
}

impl FileCounts {
    /// All submitted items have reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.in_progress == 0
    }
}

/// Result of publishing one changed-set to the remote index.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub uploaded: usize,
    pub failed: usize,
    /// Per-file error descriptions; one bad file never aborts the batch.
    pub errors: Vec<String>,
    pub file_counts: Option<FileCounts>,
    /// The remote indexing poll hit its wall-clock timeout. Non-fatal.
    pub timed_out: bool,
}
