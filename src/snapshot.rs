use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::error::Error;

/// Identifies what is being watched: one URL plus one selector within it.
///
/// Immutable for the lifetime of a monitor instance. Distinct identities map
/// to distinct persisted state via [`ResourceIdentity::storage_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub url: String,
    pub selector: String,
}

impl ResourceIdentity {
    pub fn new(url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: selector.into(),
        }
    }

    /// Stable state-file key: the full SHA-256 hex digest of the URL and
    /// selector. The full digest is used so distinct targets never collide.
    pub fn storage_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.selector.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// One element captured from the monitored resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCapture {
    pub tag: String,
    pub text: String,
    pub attributes: Vec<(String, String)>,
    pub child_count: u32,
}

/// One raw observation of the monitored resource, produced fresh on every
/// acquisition attempt. Never persisted except as an optional debug artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub elements: Vec<ElementCapture>,
}

impl Snapshot {
    pub fn new(elements: Vec<ElementCapture>) -> Self {
        Self { elements }
    }

    pub fn match_count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// The acquisition capability. Implementations own navigation, rendering and
/// element extraction; the monitoring core only depends on this trait.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetches one snapshot of the identified resource. A snapshot with zero
    /// elements means the target content was absent, which is not an error.
    async fn fetch(
        &self,
        identity: &ResourceIdentity,
        timeout: Duration,
    ) -> Result<Snapshot, Error>;
}

/// Plain HTTP fetcher: captures the whole response body as a single document
/// element. The selector is not evaluated here; fetchers that render the page
/// and extract matching elements implement [`SnapshotFetcher`] themselves.
#[derive(Debug, Default)]
pub struct HttpSnapshotFetcher;

impl HttpSnapshotFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(
        &self,
        identity: &ResourceIdentity,
        timeout: Duration,
    ) -> Result<Snapshot, Error> {
        let client = Client::builder().timeout(timeout).build()?;

        let response = client.get(&identity.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        let body = response.text().await?;
        let text = body.trim();
        if text.is_empty() {
            return Ok(Snapshot::new(Vec::new()));
        }

        let mut attributes = Vec::new();
        if let Some(content_type) = content_type {
            attributes.push(("content-type".to_string(), content_type));
        }

        Ok(Snapshot::new(vec![ElementCapture {
            tag: "document".to_string(),
            text: text.to_string(),
            attributes,
            child_count: 0,
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_is_stable() {
        let a = ResourceIdentity::new("https://example.com", "#price");
        let b = ResourceIdentity::new("https://example.com", "#price");
        assert_eq!(a.storage_key(), b.storage_key());
        // full SHA-256 hex digest
        assert_eq!(a.storage_key().len(), 64);
    }

    #[test]
    fn test_storage_key_distinguishes_targets() {
        let by_url = ResourceIdentity::new("https://example.com/a", "#price");
        let by_selector = ResourceIdentity::new("https://example.com/a", "#stock");
        assert_ne!(by_url.storage_key(), by_selector.storage_key());

        let other_url = ResourceIdentity::new("https://example.com/b", "#price");
        assert_ne!(by_url.storage_key(), other_url.storage_key());
    }

    #[test]
    fn test_empty_snapshot_reports_no_matches() {
        let snapshot = Snapshot::new(Vec::new());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.match_count(), 0);
    }
}
