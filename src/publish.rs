//! Publishing pipeline: push changed artifacts into the remote index.
//!
//! Receives the run's changed-set (slugs added or updated by the sync pass)
//! and uploads exactly those artifacts to the vector store, creating the
//! vector store and its assistant on first use. An empty changed-set makes
//! zero remote calls.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::IndexConfig;
use crate::models::PublishReport;
use crate::openai::IndexBackend;
use crate::store::CorpusStore;

pub struct Publisher<'a> {
    backend: &'a dyn IndexBackend,
    config: &'a IndexConfig,
}

impl<'a> Publisher<'a> {
    pub fn new(backend: &'a dyn IndexBackend, config: &'a IndexConfig) -> Self {
        Self { backend, config }
    }

    /// Upload each changed artifact, bind the assistant, and wait for remote
    /// indexing to settle.
    ///
    /// One bad file never aborts the batch; its error lands in the report.
    /// Hitting the indexing poll timeout is reported, not raised.
    pub fn publish(
        &self,
        store: &mut CorpusStore,
        changed_slugs: &[String],
    ) -> Result<PublishReport> {
        let mut report = PublishReport::default();
        if changed_slugs.is_empty() {
            info!("no changed documents, skipping publish");
            return Ok(report);
        }

        let vector_store_id = self.ensure_vector_store(store)?;

        for slug in changed_slugs {
            let path = store.artifact_path(slug);
            let result = self
                .backend
                .upload_file(&path)
                .and_then(|file_id| self.backend.attach_file(&vector_store_id, &file_id));
            match result {
                Ok(()) => {
                    info!(slug = %slug, "published artifact");
                    report.uploaded += 1;
                }
                Err(e) => {
                    warn!(slug = %slug, "publish failed: {e:#}");
                    report.failed += 1;
                    report.errors.push(format!("{}: {:#}", slug, e));
                }
            }
        }

        self.ensure_assistant(store, &vector_store_id)?;

        if report.uploaded > 0 {
            self.wait_for_indexing(&vector_store_id, &mut report);
        }

        Ok(report)
    }

    /// Reuse the recorded vector store when it still exists remotely,
    /// otherwise create a fresh one and persist its id.
    fn ensure_vector_store(&self, store: &mut CorpusStore) -> Result<String> {
        if let Some(id) = store.vector_store_id() {
            if self.backend.vector_store_exists(&id)? {
                return Ok(id);
            }
            warn!(id = %id, "recorded vector store no longer exists, recreating");
        }

        let id = self
            .backend
            .create_vector_store(&self.config.store_name)
            .context("Failed to create vector store")?;
        info!(id = %id, name = %self.config.store_name, "created vector store");
        store.set_vector_store_id(id.clone())?;
        Ok(id)
    }

    fn ensure_assistant(&self, store: &mut CorpusStore, vector_store_id: &str) -> Result<String> {
        if let Some(id) = store.assistant_id() {
            if self.backend.assistant_exists(&id)? {
                return Ok(id);
            }
            warn!(id = %id, "recorded assistant no longer exists, recreating");
        }

        let id = self
            .backend
            .create_assistant(
                &self.config.assistant_name,
                &self.config.instructions,
                &self.config.model,
                vector_store_id,
            )
            .context("Failed to create assistant")?;
        info!(id = %id, name = %self.config.assistant_name, "created assistant");
        store.set_assistant_id(id.clone())?;
        Ok(id)
    }

    /// Poll the vector store until every submitted file reaches a terminal
    /// state or the wall-clock ceiling is hit.
    fn wait_for_indexing(&self, vector_store_id: &str, report: &mut PublishReport) {
        let deadline = Instant::now() + Duration::from_secs(self.config.poll_timeout_secs);
        let interval = Duration::from_secs(self.config.poll_interval_secs);

        loop {
            match self.backend.file_counts(vector_store_id) {
                Ok(counts) => {
                    report.file_counts = Some(counts);
                    if counts.is_settled() {
                        info!(
                            completed = counts.completed,
                            failed = counts.failed,
                            "remote indexing settled"
                        );
                        return;
                    }
                    info!(in_progress = counts.in_progress, "remote indexing in progress");
                }
                Err(e) => {
                    // Status visibility only; the uploads already succeeded.
                    // Keep polling until the deadline.
                    warn!("indexing status poll failed, retrying: {e:#}");
                }
            }

            if Instant::now() + interval > deadline {
                warn!(
                    timeout_secs = self.config.poll_timeout_secs,
                    "remote indexing still in progress at poll timeout"
                );
                report.timed_out = true;
                return;
            }
            std::thread::sleep(interval);
        }
    }
}
