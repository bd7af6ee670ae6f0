use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::snapshot::{ElementCapture, ResourceIdentity, Snapshot};

/// Attribute names whose values churn between fetches without the content
/// meaningfully changing. Dropped from the canonical form when
/// `ignore_minor_changes` is enabled.
const VOLATILE_ATTRIBUTES: &[&str] = &[
    "nonce",
    "timestamp",
    "data-timestamp",
    "data-updated",
    "data-nonce",
    "data-request-id",
];

/// Canonical view of one captured element: trimmed text, attributes sorted by
/// name, volatile attributes optionally removed. Field order is fixed, so the
/// serialized form is deterministic.
#[derive(Debug, Serialize)]
struct CanonicalElement<'a> {
    tag: &'a str,
    text: &'a str,
    attributes: Vec<(&'a str, &'a str)>,
    child_count: u32,
}

/// Coarse metadata persisted alongside the hash. Not part of the hash input;
/// used to describe what changed between two fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub element_count: usize,
    pub text_bytes: usize,
    pub tag_counts: BTreeMap<String, usize>,
}

/// A stable hash of the canonicalized snapshot plus its summary metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    pub summary: SnapshotSummary,
}

/// The persisted unit: exactly one record is current per watched resource,
/// replaced whole on every write. The hash is a function of the canonicalized
/// snapshot only, never of the timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub selector: String,
    pub summary: SnapshotSummary,
}

impl FingerprintRecord {
    pub fn new(identity: &ResourceIdentity, fingerprint: &Fingerprint) -> Self {
        Self {
            hash: fingerprint.hash.clone(),
            timestamp: Utc::now(),
            url: identity.url.clone(),
            selector: identity.selector.clone(),
            summary: fingerprint.summary.clone(),
        }
    }
}

/// Result of canonicalizing a snapshot. A snapshot with zero elements yields
/// the `Empty` sentinel, which is distinct from an acquisition failure.
#[derive(Debug)]
pub enum Extraction {
    Empty,
    Content(Fingerprint),
}

/// Maps a snapshot to its canonical form and stable hash.
///
/// Reproducible across identical inputs and sensitive to element order as the
/// resource presents it. With `ignore_minor_changes`, deny-listed volatile
/// attributes are excluded so two snapshots differing only in those hash
/// identically.
pub fn extract(snapshot: &Snapshot, ignore_minor_changes: bool) -> Result<Extraction, Error> {
    if snapshot.is_empty() {
        return Ok(Extraction::Empty);
    }

    let canonical: Vec<CanonicalElement> = snapshot
        .elements
        .iter()
        .map(|el| canonicalize(el, ignore_minor_changes))
        .collect();

    let bytes = serde_json::to_vec(&canonical)?;
    let hash = hex::encode(Sha256::digest(&bytes));

    Ok(Extraction::Content(Fingerprint {
        hash,
        summary: summarize(snapshot),
    }))
}

fn canonicalize(element: &ElementCapture, ignore_minor_changes: bool) -> CanonicalElement<'_> {
    let mut attributes: Vec<(&str, &str)> = element
        .attributes
        .iter()
        .filter(|(name, _)| !(ignore_minor_changes && is_volatile(name)))
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    attributes.sort_by(|a, b| a.0.cmp(b.0));

    CanonicalElement {
        tag: &element.tag,
        text: element.text.trim(),
        attributes,
        child_count: element.child_count,
    }
}

fn is_volatile(name: &str) -> bool {
    VOLATILE_ATTRIBUTES
        .iter()
        .any(|volatile| name.eq_ignore_ascii_case(volatile))
}

fn summarize(snapshot: &Snapshot) -> SnapshotSummary {
    let mut tag_counts = BTreeMap::new();
    let mut text_bytes = 0;
    for element in &snapshot.elements {
        *tag_counts.entry(element.tag.clone()).or_insert(0) += 1;
        text_bytes += element.text.trim().len();
    }
    SnapshotSummary {
        element_count: snapshot.elements.len(),
        text_bytes,
        tag_counts,
    }
}

/// Human-readable descriptions of what changed between two summaries. Coarse
/// on purpose: this reports counts, not a structural diff.
pub fn describe_changes(previous: &SnapshotSummary, current: &SnapshotSummary) -> Vec<String> {
    let mut deltas = Vec::new();

    if previous.element_count != current.element_count {
        deltas.push(format!(
            "element count changed from {} to {}",
            previous.element_count, current.element_count
        ));
    }
    if previous.text_bytes != current.text_bytes {
        deltas.push(format!(
            "text length changed from {} to {} bytes",
            previous.text_bytes, current.text_bytes
        ));
    }

    let tags: std::collections::BTreeSet<&String> = previous
        .tag_counts
        .keys()
        .chain(current.tag_counts.keys())
        .collect();
    for tag in tags {
        let before = previous.tag_counts.get(tag).copied().unwrap_or(0);
        let after = current.tag_counts.get(tag).copied().unwrap_or(0);
        if before != after {
            deltas.push(format!("'{tag}' count changed from {before} to {after}"));
        }
    }

    if deltas.is_empty() {
        deltas.push("text content changed".to_string());
    }

    deltas
}
