//! Wire-level constants and URL assembly.
//!
//! Query parameter names, reserved endpoint segments, and the `Url` helpers
//! the client uses to build request targets. Path segments are pushed through
//! [`url::Url::path_segments_mut`], which percent-escapes reserved characters,
//! so document and attachment names never need pre-escaping by callers.
//!
//! # Examples
//!
//! ```
//! use feathercouch::protocol::{self, params};
//! use url::Url;
//!
//! let base = Url::parse("http://127.0.0.1:5984/db").unwrap();
//! let mut url = protocol::join(&base, &["some/doc"]);
//! protocol::append_query(&mut url, params::REV, "1-abc");
//! assert_eq!(url.as_str(), "http://127.0.0.1:5984/db/some%2Fdoc?rev=1-abc");
//! ```

use url::Url;

/// The JSON media type attached to request and accepted response bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// Query parameter names.
pub mod params {
    /// Revision token selector on reads and deletes.
    pub const REV: &str = "rev";
    /// Feed mode selector on the changes endpoint.
    pub const FEED: &str = "feed";
    /// Sequence marker to start the changes feed from.
    pub const SINCE: &str = "since";
    /// Maximum number of rows to return.
    pub const LIMIT: &str = "limit";
    /// Keep-alive newline interval for the continuous feed, in milliseconds.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Server-side wait bound for the feed, in milliseconds.
    pub const TIMEOUT: &str = "timeout";
    /// Named filter function reference (`design/filter`).
    pub const FILTER: &str = "filter";
    /// Embed the full document body in each change row.
    pub const INCLUDE_DOCS: &str = "include_docs";
    /// Revision style for change rows.
    pub const STYLE: &str = "style";
    /// Deferred-write marker on single-document posts.
    pub const BATCH: &str = "batch";
}

/// Reserved endpoint path segments.
pub mod paths {
    /// Bulk create/update endpoint.
    pub const BULK_DOCS: &str = "_bulk_docs";
    /// Declarative JSON query endpoint.
    pub const FIND: &str = "_find";
    /// Change notifications endpoint.
    pub const CHANGES: &str = "_changes";
}

/// Values of the `feed` query parameter.
pub mod feeds {
    /// One-shot feed returning a single page.
    pub const NORMAL: &str = "normal";
    /// Long-lived feed streamed one row per line.
    pub const CONTINUOUS: &str = "continuous";
}

/// Return a copy of `base` with the given path segments appended, each
/// percent-escaped as one segment.
pub fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    url
}

/// Append one query pair to `url`, escaping key and value.
pub fn append_query(url: &mut Url, key: &str, value: &str) {
    url.query_pairs_mut().append_pair(key, value);
}
