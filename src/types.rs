//! Core wire types: documents, write results, and change rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A generic document carrying the reserved `_id`/`_rev` fields plus
/// arbitrary user content.
///
/// Any `Serialize` type with `_id`/`_rev` string fields works with the
/// document operations; this type is a convenience for callers that work
/// with schemaless content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier. Absent on a document that has not been saved.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Revision token assigned by the server on the last successful write.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// All remaining fields of the document body.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Document {
    /// Create an empty document with no identifier.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Outcome of a single write, as reported by the server.
///
/// Plain writes return one of these; bulk writes return one per input
/// document, in input order. A rejected bulk item arrives with `ok` absent
/// and an `error` field set, so [`WriteResult::succeeded`] must be checked
/// per entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteResult {
    /// Success indicator. Absent (decoded as `false`) on rejected items.
    #[serde(default)]
    pub ok: bool,

    /// The document identifier the result refers to.
    #[serde(default)]
    pub id: String,

    /// The new revision token. Empty on rejected items.
    #[serde(default)]
    pub rev: String,

    /// Server error tag (e.g. `conflict`) when the write was rejected.
    #[serde(default)]
    pub error: Option<String>,

    /// Human-readable rejection reason.
    #[serde(default)]
    pub reason: Option<String>,
}

impl WriteResult {
    /// Whether the write was accepted. A missing success indicator reads as
    /// failed.
    pub fn succeeded(&self) -> bool {
        self.ok && self.error.is_none()
    }
}

/// One revision entry inside a change row.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRev {
    /// The revision token.
    pub rev: String,
}

/// One row of the changes feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRow {
    /// Sequence marker. Kept opaque: servers emit either numbers or strings.
    #[serde(default)]
    pub seq: Value,

    /// Identifier of the changed document.
    #[serde(default)]
    pub id: String,

    /// The document's leaf revisions.
    #[serde(default)]
    pub changes: Vec<ChangeRev>,

    /// The full document body, present when the feed was opened with
    /// `include_docs`.
    #[serde(default)]
    pub doc: Option<Value>,

    /// Whether this change is a deletion.
    #[serde(default)]
    pub deleted: bool,
}

/// Result of a one-shot (`feed=normal`) changes request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesPage {
    /// The change rows.
    #[serde(default)]
    pub results: Vec<ChangeRow>,

    /// Sequence marker at which the page ends; feed from here to resume.
    #[serde(default)]
    pub last_seq: Value,

    /// Number of changes not included in the page, when reported.
    #[serde(default)]
    pub pending: Option<u64>,
}

/// Envelope posted to the bulk-docs endpoint.
#[derive(Serialize)]
pub(crate) struct BulkEnvelope<'a, T> {
    pub new_edits: bool,
    pub docs: &'a [T],
}
