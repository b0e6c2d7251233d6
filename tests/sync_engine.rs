//! End-to-end sync engine tests against an in-memory article source.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};

use anyhow::{bail, Result};
use tempfile::TempDir;

use helpsync::config::Config;
use helpsync::models::{Article, ArticleMeta};
use helpsync::store::CorpusStore;
use helpsync::sync::run_sync;
use helpsync::zendesk::ArticleSource;

/// In-memory paginated source. Cursors are `page:{n}` tokens; the engine
/// must treat them as opaque and replay them verbatim.
struct FakeSource {
    pages: Vec<Vec<Article>>,
    failing: HashSet<u64>,
    page_fetches: Cell<usize>,
    article_fetches: RefCell<Vec<u64>>,
}

impl FakeSource {
    fn new(pages: Vec<Vec<Article>>) -> Self {
        Self {
            pages,
            failing: HashSet::new(),
            page_fetches: Cell::new(0),
            article_fetches: RefCell::new(Vec::new()),
        }
    }

    fn single_page(articles: Vec<Article>) -> Self {
        Self::new(vec![articles])
    }
}

impl ArticleSource for FakeSource {
    fn fetch_page(
        &self,
        cursor: Option<&str>,
        _per_page: usize,
    ) -> Result<(Vec<ArticleMeta>, Option<String>)> {
        self.page_fetches.set(self.page_fetches.get() + 1);
        let index: usize = match cursor {
            None => 0,
            Some(token) => match token.strip_prefix("page:") {
                Some(n) => n.parse()?,
                None => bail!("unknown cursor token: {}", token),
            },
        };
        let page = self.pages.get(index).cloned().unwrap_or_default();
        let metas = page
            .iter()
            .map(|a| ArticleMeta {
                id: a.id,
                title: a.title.clone(),
                html_url: a.html_url.clone(),
                updated_at: a.updated_at.clone(),
            })
            .collect();
        let next = if index + 1 < self.pages.len() {
            Some(format!("page:{}", index + 1))
        } else {
            None
        };
        Ok((metas, next))
    }

    fn fetch_article(&self, id: u64) -> Result<Article> {
        self.article_fetches.borrow_mut().push(id);
        if self.failing.contains(&id) {
            bail!("simulated content fetch failure for {}", id);
        }
        self.pages
            .iter()
            .flatten()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown article {}", id))
    }
}

fn article(id: u64, title: &str, body: &str) -> Article {
    Article {
        id,
        title: title.to_string(),
        body: Some(body.to_string()),
        html_url: format!("https://support.example.com/hc/articles/{}", id),
        updated_at: "2025-06-01T00:00:00Z".to_string(),
    }
}

fn five_articles() -> Vec<Article> {
    (1..=5)
        .map(|i| {
            article(
                i,
                &format!("Article {}", i),
                &format!("<h1>Doc {}</h1><p>Body of document {}.</p>", i, i),
            )
        })
        .collect()
}

fn test_store() -> (TempDir, CorpusStore) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.corpus.articles_dir = tmp.path().join("articles");
    config.corpus.state_file = tmp.path().join("state.json");
    let store = CorpusStore::open(&config).unwrap();
    (tmp, store)
}

#[test]
fn fresh_run_adds_every_article() {
    let (_tmp, mut store) = test_store();
    let source = FakeSource::single_page(five_articles());

    let summary = run_sync(&source, &mut store, 30).unwrap();

    assert_eq!(summary.total_fetched, 5);
    assert_eq!(summary.added, 5);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.changed_slugs.len(), 5);
    assert!(summary.pagination_complete);

    assert_eq!(store.state().articles.len(), 5);
    assert_eq!(store.state().total_articles, 5);
    for slug in &summary.changed_slugs {
        assert!(store.artifact_path(slug).exists());
    }
}

#[test]
fn unchanged_rerun_produces_empty_changed_set() {
    let (_tmp, mut store) = test_store();
    let source = FakeSource::single_page(five_articles());

    run_sync(&source, &mut store, 30).unwrap();
    let second = run_sync(&source, &mut store, 30).unwrap();

    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 5);
    assert!(second.changed_slugs.is_empty());
}

#[test]
fn edited_article_is_the_only_one_republished() {
    let (_tmp, mut store) = test_store();
    run_sync(&FakeSource::single_page(five_articles()), &mut store, 30).unwrap();

    let mut edited = five_articles();
    edited[2].body = Some("<p>Completely rewritten body.</p>".to_string());
    let summary = run_sync(&FakeSource::single_page(edited), &mut store, 30).unwrap();

    assert_eq!(summary.added, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.changed_slugs, vec!["article-3".to_string()]);
}

#[test]
fn timestamp_bump_without_content_change_is_skipped() {
    let (_tmp, mut store) = test_store();
    run_sync(&FakeSource::single_page(five_articles()), &mut store, 30).unwrap();

    // Remote timestamp moved, content did not. Fingerprint wins.
    let mut bumped = five_articles();
    for a in &mut bumped {
        a.updated_at = "2025-07-15T09:30:00Z".to_string();
    }
    let summary = run_sync(&FakeSource::single_page(bumped), &mut store, 30).unwrap();

    assert_eq!(summary.skipped, 5);
    assert!(summary.changed_slugs.is_empty());
}

#[test]
fn markup_noise_does_not_count_as_a_change() {
    let (_tmp, mut store) = test_store();
    let original = vec![article(1, "Doc", "<p>Same    content here.</p>")];
    run_sync(&FakeSource::single_page(original), &mut store, 30).unwrap();

    // Whitespace reflow in the source HTML normalizes to identical markdown.
    let reflowed = vec![article(1, "Doc", "<p>\n  Same content\n  here.\n</p>")];
    let summary = run_sync(&FakeSource::single_page(reflowed), &mut store, 30).unwrap();

    assert_eq!(summary.updated, 0);
    assert_eq!(summary.skipped, 1);
}

#[test]
fn content_fetch_failure_is_isolated_to_one_article() {
    let (_tmp, mut store) = test_store();
    let mut source = FakeSource::single_page(five_articles());
    source.failing.insert(3);

    let summary = run_sync(&source, &mut store, 30).unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.added, 4);
    assert_eq!(store.state().articles.len(), 4);
    assert!(!store.state().articles.contains_key("3"));
}

#[test]
fn empty_body_is_skipped_without_an_artifact() {
    let (_tmp, mut store) = test_store();
    let mut articles = five_articles();
    articles[0].body = None;
    articles[1].body = Some("   ".to_string());
    let summary = run_sync(&FakeSource::single_page(articles), &mut store, 30).unwrap();

    assert_eq!(summary.added, 3);
    assert_eq!(summary.skipped, 2);
    assert!(!store.state().articles.contains_key("1"));
    assert!(!store.state().articles.contains_key("2"));
}

#[test]
fn non_ascii_content_syncs_without_errors() {
    let (_tmp, mut store) = test_store();
    let articles = vec![article(
        1,
        "Écran d'accueil",
        r#"<p>&aaaaaaaaaaé suite — München</p><a title="İzmir" href="/hc/x">détails</a>"#,
    )];

    let summary = run_sync(&FakeSource::single_page(articles), &mut store, 30).unwrap();

    assert_eq!(summary.added, 1);
    assert_eq!(summary.errors, 0);
    let slug = &summary.changed_slugs[0];
    let content = std::fs::read_to_string(store.artifact_path(slug)).unwrap();
    assert!(content.contains("&aaaaaaaaaaé suite — München"));
    // The href after the non-ASCII title attribute still resolves.
    assert!(content.contains("[détails](https://support.example.com/hc/x)"));
}

#[test]
fn cursor_advances_even_when_every_content_fetch_fails() {
    // The continuation cursor must be committed before per-article work, so
    // a batch full of failures still moves the listing forward.
    let (_tmp, mut store) = test_store();
    let pages = vec![five_articles(), vec![article(6, "Article 6", "<p>Six.</p>")]];
    let mut source = FakeSource::new(pages);
    source.failing.extend(1..=5);

    let summary = run_sync(&source, &mut store, 30).unwrap();

    assert_eq!(summary.errors, 5);
    assert!(!summary.pagination_complete);
    assert_eq!(store.cursor().as_deref(), Some("page:1"));
}

#[test]
fn scheduled_runs_walk_the_full_listing_then_wrap_around() {
    let (_tmp, mut store) = test_store();
    let pages = vec![
        vec![article(1, "One", "<p>1</p>"), article(2, "Two", "<p>2</p>")],
        vec![article(3, "Three", "<p>3</p>"), article(4, "Four", "<p>4</p>")],
        vec![article(5, "Five", "<p>5</p>")],
    ];
    let source = FakeSource::new(pages);

    let mut seen = BTreeSet::new();
    let first = run_sync(&source, &mut store, 2).unwrap();
    seen.extend(first.changed_slugs.clone());
    assert!(!first.pagination_complete);

    let second = run_sync(&source, &mut store, 2).unwrap();
    seen.extend(second.changed_slugs.clone());
    assert!(!second.pagination_complete);

    let third = run_sync(&source, &mut store, 2).unwrap();
    seen.extend(third.changed_slugs.clone());
    assert!(third.pagination_complete);

    // Every article visited exactly once across the cycle.
    assert_eq!(seen.len(), 5);
    assert_eq!(source.page_fetches.get(), 3);
    assert!(store.cursor().is_none());

    // The next run wraps around to the first page and finds no changes.
    let fourth = run_sync(&source, &mut store, 2).unwrap();
    assert_eq!(fourth.skipped, 2);
    assert!(fourth.changed_slugs.is_empty());
}

#[test]
fn state_and_cursor_survive_a_reopen_between_runs() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.corpus.articles_dir = tmp.path().join("articles");
    config.corpus.state_file = tmp.path().join("state.json");

    let pages = vec![
        vec![article(1, "One", "<p>1</p>")],
        vec![article(2, "Two", "<p>2</p>")],
    ];

    {
        let mut store = CorpusStore::open(&config).unwrap();
        run_sync(&FakeSource::new(pages.clone()), &mut store, 1).unwrap();
    }

    // Fresh process picks up where the last one left off.
    let mut store = CorpusStore::open(&config).unwrap();
    assert_eq!(store.cursor().as_deref(), Some("page:1"));

    let summary = run_sync(&FakeSource::new(pages), &mut store, 1).unwrap();
    assert_eq!(summary.added, 1);
    assert_eq!(summary.changed_slugs, vec!["two".to_string()]);
    assert!(summary.pagination_complete);
}

#[test]
fn reset_clears_corpus_state_and_cursor() {
    let (_tmp, mut store) = test_store();
    let pages = vec![five_articles(), vec![article(6, "Six", "<p>6</p>")]];
    run_sync(&FakeSource::new(pages), &mut store, 30).unwrap();
    assert!(store.cursor().is_some());

    store.reset().unwrap();

    assert!(store.state().articles.is_empty());
    assert!(store.cursor().is_none());
    let remaining: Vec<_> = std::fs::read_dir(store.articles_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "md").unwrap_or(false))
        .collect();
    assert!(remaining.is_empty());
}
