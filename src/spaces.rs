//! S3-compatible object store client.
//!
//! Persists the sync state (and the auxiliary run log) to AWS S3 or an
//! S3-compatible service (DigitalOcean Spaces, MinIO). Requests are signed
//! with AWS Signature Version 4 using only pure-Rust dependencies (`hmac`,
//! `sha2`), so no C library dependencies are pulled in.
//!
//! Custom endpoints use path-style addressing (`endpoint/bucket/key`);
//! plain AWS uses virtual-hosted style (`bucket.s3.region.amazonaws.com`).
//!
//! # Environment Variables
//!
//! Credentials are read from `SPACES_ACCESS_KEY_ID` /
//! `SPACES_SECRET_ACCESS_KEY`, falling back to `AWS_ACCESS_KEY_ID` /
//! `AWS_SECRET_ACCESS_KEY`. `AWS_SESSION_TOKEN` is honored when present.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use crate::config::ObjectStoreConfig;

type HmacSha256 = Hmac<Sha256>;

/// Credentials for the object store, loaded from environment variables.
pub struct SpacesCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl SpacesCredentials {
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("SPACES_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
            .context("SPACES_ACCESS_KEY_ID / AWS_ACCESS_KEY_ID not set")?;
        let secret_access_key = std::env::var("SPACES_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
            .context("SPACES_SECRET_ACCESS_KEY / AWS_SECRET_ACCESS_KEY not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Blocking client for a single bucket.
pub struct SpacesClient {
    config: ObjectStoreConfig,
    creds: SpacesCredentials,
    client: reqwest::blocking::Client,
}

impl SpacesClient {
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        let creds = SpacesCredentials::from_env()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            creds,
            client,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Download an object as UTF-8 text. Returns `None` if the key does not
    /// exist.
    pub fn download(&self, key: &str) -> Result<Option<String>> {
        let resp = self.send("GET", key, &[], None)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            bail!(
                "GetObject failed for '{}' (HTTP {}): {}",
                key,
                status,
                body.chars().take(300).collect::<String>()
            );
        }
        debug!(key, "downloaded object");
        Ok(Some(resp.text()?))
    }

    /// Upload a text or JSON object, replacing any existing content.
    pub fn upload(&self, key: &str, body: &[u8], content_type: &str) -> Result<()> {
        let resp = self.send("PUT", key, body, Some(content_type))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            bail!(
                "PutObject failed for '{}' (HTTP {}): {}",
                key,
                status,
                text.chars().take(300).collect::<String>()
            );
        }
        debug!(key, bytes = body.len(), "uploaded object");
        Ok(())
    }

    /// Delete an object. Missing keys are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        let resp = self.send("DELETE", key, &[], None)?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            bail!("DeleteObject failed for '{}' (HTTP {})", key, resp.status());
        }
        Ok(())
    }

    /// Append text to an object via download + concatenate + re-upload.
    ///
    /// Not atomic; used only by the auxiliary run-log sink where a lost
    /// line under concurrent writers is acceptable.
    pub fn append(&self, key: &str, text: &str) -> Result<()> {
        let mut current = self.download(key)?.unwrap_or_default();
        current.push_str(text);
        self.upload(key, current.as_bytes(), "text/plain")
    }

    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }

    /// Canonical URI for `key`: path-style when a custom endpoint is set,
    /// virtual-hosted style otherwise.
    fn canonical_uri(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        if self.config.endpoint_url.is_some() {
            format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key)
        } else {
            format!("/{}", encoded_key)
        }
    }

    /// Build, sign, and send one request. All requests carry an empty query
    /// string; the payload is hashed into the signature.
    fn send(
        &self,
        method: &str,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<reqwest::blocking::Response> {
        let host = self.host();
        let canonical_uri = self.canonical_uri(key);
        let url = format!("https://{}{}", host, canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(body);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req = match method {
            "GET" => self.client.get(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            other => bail!("Unsupported object store method: {}", other),
        };

        req = req
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if let Some(ct) = content_type {
            req = req.header("Content-Type", ct);
        }
        if !body.is_empty() {
            req = req.body(body.to_vec());
        }

        req.send().with_context(|| {
            format!(
                "Object store request failed: {} s3://{}/{}",
                method, self.config.bucket, key
            )
        })
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_matches_aws_reference_vector() {
        // Example from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn uri_encode_preserves_unreserved() {
        assert_eq!(uri_encode("state/state.json"), "state%2Fstate.json");
        assert_eq!(uri_encode("abc-DEF_1.2~"), "abc-DEF_1.2~");
        assert_eq!(uri_encode("a b"), "a%20b");
    }

    #[test]
    fn payload_hash_of_empty_body() {
        // SHA-256 of the empty string, as required for unsigned-body verbs.
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
