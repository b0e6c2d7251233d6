//! Zendesk Help Center listing source.
//!
//! Fetches article metadata pages and per-article content from the public
//! Help Center API (no authentication for public centers). The listing is
//! two-step: a paginated metadata list, then one content fetch per article.
//!
//! The pagination cursor handed back by [`ArticleSource::fetch_page`] is the
//! response's `next_page` URL and is replayed verbatim on the next call —
//! never parsed, constructed, or mutated by callers.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::models::{Article, ArticleMeta};

/// A paginated source of articles.
///
/// `ZendeskClient` is the production implementation; tests drive the sync
/// engine with in-memory fakes.
pub trait ArticleSource {
    /// Fetch one page of article metadata.
    ///
    /// `cursor` is an opaque continuation token from a previous call, or
    /// `None` to start from the beginning of the listing. Returns the page
    /// plus the next cursor; `None` means the listing is exhausted.
    fn fetch_page(
        &self,
        cursor: Option<&str>,
        per_page: usize,
    ) -> Result<(Vec<ArticleMeta>, Option<String>)>;

    /// Fetch the full content of a single article.
    fn fetch_article(&self, id: u64) -> Result<Article>;
}

/// Blocking client for the Zendesk Help Center public API.
pub struct ZendeskClient {
    articles_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct ListResponse {
    articles: Vec<ArticleMeta>,
    /// Full continuation URL, or null on the last page.
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct ShowResponse {
    article: Article,
}

impl ZendeskClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            articles_url: format!(
                "https://{}.zendesk.com/api/v2/help_center/{}/articles",
                config.subdomain, config.locale
            ),
            client,
        })
    }
}

impl ArticleSource for ZendeskClient {
    fn fetch_page(
        &self,
        cursor: Option<&str>,
        per_page: usize,
    ) -> Result<(Vec<ArticleMeta>, Option<String>)> {
        let response = match cursor {
            Some(url) => {
                debug!(url, "fetching listing continuation page");
                self.client.get(url).send()
            }
            None => {
                debug!(url = %self.articles_url, per_page, "fetching first listing page");
                self.client
                    .get(&self.articles_url)
                    .query(&[
                        ("per_page", per_page.to_string()),
                        ("sort_by", "updated_at".to_string()),
                        ("sort_order", "desc".to_string()),
                    ])
                    .send()
            }
        }
        .context("Listing fetch failed")?
        .error_for_status()
        .context("Listing fetch returned an error status")?;

        // A response that parses but lacks required fields is a protocol
        // mismatch, surfaced as a fatal run error.
        let page: ListResponse = response
            .json()
            .context("Malformed listing response (missing expected fields)")?;

        info!(fetched = page.articles.len(), "fetched listing page");
        if page.next_page.is_none() {
            info!("no more pages, pagination cycle complete");
        }

        Ok((page.articles, page.next_page))
    }

    fn fetch_article(&self, id: u64) -> Result<Article> {
        let url = format!("{}/{}", self.articles_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("Content fetch failed for article {}", id))?
            .error_for_status()
            .with_context(|| format!("Content fetch returned an error status for article {}", id))?;

        let show: ShowResponse = response
            .json()
            .with_context(|| format!("Malformed article response for {}", id))?;

        Ok(show.article)
    }
}
