//! OpenAI vector store / assistant API client.
//!
//! Thin blocking client over the `/v1` REST surface: file upload, vector
//! store management, and assistant management. The [`IndexBackend`] trait is
//! the seam the publishing pipeline is written against; tests substitute a
//! recording fake.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::models::FileCounts;

const API_BASE: &str = "https://api.openai.com/v1";

/// A named remote resource, as returned by list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteResource {
    pub id: String,
    #[serde(default, alias = "filename")]
    pub name: Option<String>,
}

/// Remote document index: a vector store plus the assistant bound to it.
pub trait IndexBackend {
    fn create_vector_store(&self, name: &str) -> Result<String>;
    fn vector_store_exists(&self, id: &str) -> Result<bool>;
    fn delete_vector_store(&self, id: &str) -> Result<()>;

    /// Upload a local file for assistant use; returns the remote file id.
    fn upload_file(&self, path: &Path) -> Result<String>;
    fn attach_file(&self, vector_store_id: &str, file_id: &str) -> Result<()>;
    fn delete_file(&self, file_id: &str) -> Result<()>;

    /// Current processing counts for a vector store's files.
    fn file_counts(&self, vector_store_id: &str) -> Result<FileCounts>;

    fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
        vector_store_id: &str,
    ) -> Result<String>;
    fn assistant_exists(&self, id: &str) -> Result<bool>;
    fn delete_assistant(&self, id: &str) -> Result<()>;

    fn list_vector_stores(&self) -> Result<Vec<RemoteResource>>;
    fn list_assistants(&self) -> Result<Vec<RemoteResource>>;
    fn list_files(&self) -> Result<Vec<RemoteResource>>;
}

/// Production backend, authenticated via `OPENAI_API_KEY`.
pub struct OpenAiClient {
    api_key: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    data: Vec<RemoteResource>,
}

#[derive(Deserialize)]
struct VectorStoreObject {
    #[serde(default)]
    file_counts: FileCounts,
}

impl OpenAiClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { api_key, client })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::blocking::RequestBuilder {
        self.client
            .request(method, format!("{}{}", API_BASE, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send, check the status, and deserialize. Non-2xx becomes an error
    /// carrying the response body excerpt.
    fn expect_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::blocking::RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let resp = builder
            .send()
            .with_context(|| format!("{} request failed", what))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            bail!(
                "{} failed (HTTP {}): {}",
                what,
                status,
                body.chars().take(300).collect::<String>()
            );
        }
        resp.json()
            .with_context(|| format!("Malformed {} response", what))
    }

    /// GET a resource by id; distinguishes "missing" from other failures.
    fn exists(&self, path: &str, what: &str) -> Result<bool> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .with_context(|| format!("{} lookup failed", what))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !resp.status().is_success() {
            bail!("{} lookup failed (HTTP {})", what, resp.status());
        }
        Ok(true)
    }

    fn delete(&self, path: &str, what: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, path)
            .send()
            .with_context(|| format!("{} delete failed", what))?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            bail!("{} delete failed (HTTP {})", what, resp.status());
        }
        Ok(())
    }
}

impl IndexBackend for OpenAiClient {
    fn create_vector_store(&self, name: &str) -> Result<String> {
        let body = json!({ "name": name });
        let created: IdResponse = self.expect_json(
            self.request(reqwest::Method::POST, "/vector_stores").json(&body),
            "Vector store create",
        )?;
        debug!(id = %created.id, "created vector store");
        Ok(created.id)
    }

    fn vector_store_exists(&self, id: &str) -> Result<bool> {
        self.exists(&format!("/vector_stores/{}", id), "Vector store")
    }

    fn delete_vector_store(&self, id: &str) -> Result<()> {
        self.delete(&format!("/vector_stores/{}", id), "Vector store")
    }

    fn upload_file(&self, path: &Path) -> Result<String> {
        let form = reqwest::blocking::multipart::Form::new()
            .text("purpose", "assistants")
            .file("file", path)
            .with_context(|| format!("Failed to read upload file: {}", path.display()))?;

        let uploaded: IdResponse = self.expect_json(
            self.request(reqwest::Method::POST, "/files").multipart(form),
            "File upload",
        )?;
        debug!(id = %uploaded.id, path = %path.display(), "uploaded file");
        Ok(uploaded.id)
    }

    fn attach_file(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        let body = json!({ "file_id": file_id });
        let _: IdResponse = self.expect_json(
            self.request(
                reqwest::Method::POST,
                &format!("/vector_stores/{}/files", vector_store_id),
            )
            .json(&body),
            "Vector store attach",
        )?;
        Ok(())
    }

    fn delete_file(&self, file_id: &str) -> Result<()> {
        self.delete(&format!("/files/{}", file_id), "File")
    }

    fn file_counts(&self, vector_store_id: &str) -> Result<FileCounts> {
        let store: VectorStoreObject = self.expect_json(
            self.request(
                reqwest::Method::GET,
                &format!("/vector_stores/{}", vector_store_id),
            ),
            "Vector store status",
        )?;
        Ok(store.file_counts)
    }

    fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
        vector_store_id: &str,
    ) -> Result<String> {
        let body = json!({
            "name": name,
            "instructions": instructions,
            "model": model,
            "tools": [{ "type": "file_search" }],
            "tool_resources": {
                "file_search": { "vector_store_ids": [vector_store_id] }
            },
        });
        let created: IdResponse = self.expect_json(
            self.request(reqwest::Method::POST, "/assistants").json(&body),
            "Assistant create",
        )?;
        debug!(id = %created.id, "created assistant");
        Ok(created.id)
    }

    fn assistant_exists(&self, id: &str) -> Result<bool> {
        self.exists(&format!("/assistants/{}", id), "Assistant")
    }

    fn delete_assistant(&self, id: &str) -> Result<()> {
        self.delete(&format!("/assistants/{}", id), "Assistant")
    }

    fn list_vector_stores(&self) -> Result<Vec<RemoteResource>> {
        let page: ListPage = self.expect_json(
            self.request(reqwest::Method::GET, "/vector_stores?limit=100"),
            "Vector store list",
        )?;
        Ok(page.data)
    }

    fn list_assistants(&self) -> Result<Vec<RemoteResource>> {
        let page: ListPage = self.expect_json(
            self.request(reqwest::Method::GET, "/assistants?limit=100"),
            "Assistant list",
        )?;
        Ok(page.data)
    }

    fn list_files(&self) -> Result<Vec<RemoteResource>> {
        let page: ListPage = self.expect_json(
            self.request(reqwest::Method::GET, "/files?purpose=assistants"),
            "File list",
        )?;
        Ok(page.data)
    }
}
