#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Feathercouch: a thin asynchronous CouchDB client
//!
//! This crate gives applications structured access to a CouchDB-compatible
//! HTTP interface: document CRUD with optimistic-concurrency revisions, bulk
//! operations, attachment upload, a declarative query endpoint, and change
//! notifications as either a one-shot page or a long-lived continuous feed.
//!
//! The client is deliberately thin. Every operation is one HTTP round trip
//! awaited to completion; nothing is retried and nothing is cached. The one
//! long-lived piece is the continuous changes feed, a cancellable pull
//! sequence over a streamed response body.
//!
//! ## Key Features
//!
//! - **Typed document operations**: any `Serialize`/`Deserialize` value with
//!   `_id`/`_rev` string fields works; [`types::Document`] covers schemaless
//!   content
//! - **Revision invariants enforced client-side**: a create must not carry a
//!   revision, an update/delete must carry both identifier and revision;
//!   violations fail before any request is issued
//! - **Per-item bulk results**: a rejected bulk item never fails the call
//! - **Streaming attachments**: upload from and download to byte streams
//!   without buffering
//! - **Continuous changes feed**: newline-delimited rows, heartbeat skipping,
//!   cooperative stop, idempotent teardown
//! - **Injectable transport**: the HTTP stack is a capability trait selected
//!   at construction
//!
//! ## Module Structure
//!
//! - **[client]** - client, configuration, transport seam, change feeds
//! - **[types]** - documents, write results, change rows
//! - **[error]** - error taxonomy and result handling
//! - **[protocol]** - wire constants and URL assembly

pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

pub use client::{
    ByteStream, Changes, ChangesStream, ContinuousChanges, CouchClient, CouchConfig, HttpRequest,
    HttpTransport, RawResponse, RequestBody, StopHandle, Transport,
};
pub use error::{CouchError, Result};
pub use types::{ChangeRev, ChangeRow, ChangesPage, Document, WriteResult};
