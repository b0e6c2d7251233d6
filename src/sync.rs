//! Incremental sync engine.
//!
//! One run processes exactly one listing page: fetch the batch at the
//! persisted cursor, commit the continuation cursor, then fetch, normalize,
//! classify, and record each article. Only content that actually changed
//! (by fingerprint) lands in the changed-set handed to publishing.
//!
//! Failure policy: listing fetch, cursor persistence, and run finalization
//! are fatal; a single article's content fetch is not and is counted as an
//! error while the rest of the batch proceeds.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::models::{Classification, RunSummary};
use crate::normalize;
use crate::store::CorpusStore;
use crate::zendesk::ArticleSource;

/// Run one sync batch against `source`, mutating `store`.
pub fn run_sync(
    source: &dyn ArticleSource,
    store: &mut CorpusStore,
    per_page: usize,
) -> Result<RunSummary> {
    let cursor = store.cursor();
    let resuming = cursor.is_some();
    info!(resuming, per_page, "starting sync batch");

    let (batch, next_cursor) = source
        .fetch_page(cursor.as_deref(), per_page)
        .context("Listing page fetch failed")?;

    // Commit the continuation cursor before touching any article, so a
    // crash mid-batch resumes at the next page instead of re-fetching this
    // one. Re-processing skipped articles is cheap; a stuck cursor is not.
    let pagination_complete = next_cursor.is_none();
    store
        .set_cursor(next_cursor)
        .context("Failed to persist pagination cursor")?;
    if pagination_complete {
        info!("pagination cycle complete, next run restarts from the beginning");
    }

    let mut summary = RunSummary {
        total_fetched: batch.len(),
        pagination_complete,
        ..RunSummary::default()
    };

    for meta in &batch {
        let article = match source.fetch_article(meta.id) {
            Ok(article) => article,
            Err(e) => {
                warn!(id = meta.id, title = %meta.title, "content fetch failed: {e:#}");
                summary.errors += 1;
                continue;
            }
        };

        let body = match article.body.as_deref() {
            Some(html) if !html.trim().is_empty() => html,
            _ => {
                info!(id = article.id, title = %article.title, "empty body, skipping");
                summary.skipped += 1;
                continue;
            }
        };

        let normalized = normalize::normalize(body, &article.html_url);
        let fingerprint = crate::store::fingerprint(&normalized);

        match store.classify(article.id, &fingerprint) {
            Classification::Unchanged => {
                summary.skipped += 1;
            }
            classification => {
                let slug = store
                    .record(&article, &normalized)
                    .with_context(|| format!("Failed to record article {}", article.id))?;
                match classification {
                    Classification::New => summary.added += 1,
                    Classification::Updated => summary.updated += 1,
                    Classification::Unchanged => unreachable!(),
                }
                summary.changed_slugs.push(slug);
            }
        }
    }

    store.finalize().context("Failed to persist sync state")?;

    info!(
        fetched = summary.total_fetched,
        added = summary.added,
        updated = summary.updated,
        skipped = summary.skipped,
        errors = summary.errors,
        "sync batch complete"
    );

    Ok(summary)
}
