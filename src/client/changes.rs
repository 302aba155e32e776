//! Change notifications: one-shot pages and the continuous feed.
//!
//! [`Changes`] is a builder over the changes endpoint. Query parameters are
//! set before the feed is opened; opening consumes the builder, so a
//! parameter can never be changed under an already-open connection.
//!
//! [`ContinuousChanges`] consumes a long-lived response body one line at a
//! time. The wire format is newline-delimited JSON: blank lines are
//! heartbeats and are skipped, a line starting with the literal prefix
//! `{"last_seq":` is the feed's terminal summary record (end of stream, not a
//! data row), and every other line is one [`ChangeRow`].
//!
//! # Lifecycle
//!
//! The feed is a single-consumer pull sequence. Each [`ContinuousChanges::next`]
//! call blocks until a row arrives, the server-driven heartbeat/timeout
//! produces data, or the connection ends. Cancellation is cooperative:
//! [`ContinuousChanges::stop`] (or a [`StopHandle`] from another task) is
//! observed at the next pull boundary and never preempts an in-progress read.
//! Termination is idempotent: whether triggered by end-of-stream, `stop`, or
//! a read/parse error, the underlying byte stream is dropped exactly once,
//! which releases the held connection.
//!
//! # Examples
//!
//! ```no_run
//! use feathercouch::{CouchClient, CouchConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> feathercouch::Result<()> {
//! let client = CouchClient::new(CouchConfig::new("127.0.0.1", 5984, "inventory"))?;
//!
//! let mut feed = client
//!     .changes()
//!     .since("now")
//!     .heartbeat(30_000)
//!     .include_docs(true)
//!     .continuous()
//!     .await?;
//!
//! let stop = feed.stop_handle();
//! while let Some(row) = feed.next().await {
//!     let row = row?;
//!     println!("{} changed at seq {}", row.id, row.seq);
//!     if row.deleted {
//!         stop.stop();
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use crate::client::documents::CouchClient;
use crate::client::transport::{ByteStream, RawResponse};
use crate::error::{CouchError, Result};
use crate::protocol::{self, feeds, params, paths};
use crate::types::{ChangeRow, ChangesPage};

/// The terminal summary record is told apart from data rows by this exact
/// textual prefix.
const LAST_SEQ_PREFIX: &[u8] = b"{\"last_seq\":";

impl CouchClient {
    /// Start building a changes request.
    pub fn changes(&self) -> Changes<'_> {
        Changes {
            client: self,
            url: protocol::join(self.database_url(), &[paths::CHANGES]),
        }
    }
}

/// Builder for a changes request.
///
/// Created by [`CouchClient::changes`]; consumed by [`Changes::run`] (one
/// shot) or [`Changes::continuous`] (long-lived feed).
pub struct Changes<'a> {
    client: &'a CouchClient,
    url: Url,
}

impl<'a> Changes<'a> {
    /// Start the feed after the given sequence marker.
    pub fn since(mut self, seq: &str) -> Self {
        protocol::append_query(&mut self.url, params::SINCE, seq);
        self
    }

    /// Bound the number of rows returned.
    pub fn limit(mut self, limit: u64) -> Self {
        protocol::append_query(&mut self.url, params::LIMIT, &limit.to_string());
        self
    }

    /// Ask the server to emit a keep-alive newline every `millis` while idle.
    pub fn heartbeat(mut self, millis: u64) -> Self {
        protocol::append_query(&mut self.url, params::HEARTBEAT, &millis.to_string());
        self
    }

    /// Ask the server to end the feed after `millis` of inactivity.
    pub fn timeout(mut self, millis: u64) -> Self {
        protocol::append_query(&mut self.url, params::TIMEOUT, &millis.to_string());
        self
    }

    /// Restrict the feed through a named filter function (`design/filter`).
    pub fn filter(mut self, filter: &str) -> Self {
        protocol::append_query(&mut self.url, params::FILTER, filter);
        self
    }

    /// Embed the full document body in each row.
    pub fn include_docs(mut self, include: bool) -> Self {
        protocol::append_query(&mut self.url, params::INCLUDE_DOCS, &include.to_string());
        self
    }

    /// Set the revision style for rows.
    pub fn style(mut self, style: &str) -> Self {
        protocol::append_query(&mut self.url, params::STYLE, style);
        self
    }

    /// Fetch one page of changes (`feed=normal`).
    pub async fn run(mut self) -> Result<ChangesPage> {
        protocol::append_query(&mut self.url, params::FEED, feeds::NORMAL);
        self.client.get_json(self.url).await
    }

    /// Open the continuous feed (`feed=continuous`).
    ///
    /// Issues one long-lived GET whose body is consumed incrementally by the
    /// returned [`ContinuousChanges`].
    pub async fn continuous(mut self) -> Result<ContinuousChanges> {
        protocol::append_query(&mut self.url, params::FEED, feeds::CONTINUOUS);
        let response = self.client.get_response(self.url).await?;
        Ok(ContinuousChanges::new(response))
    }
}

/// Cloneable handle that requests feed termination from any task.
///
/// The request takes effect at the feed's next pull boundary.
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request termination.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// A running continuous changes feed.
///
/// Pull rows with [`ContinuousChanges::next`]; `None` means the feed has
/// terminated (server summary record, explicit stop, or a prior error) and
/// the underlying connection has been released.
pub struct ContinuousChanges {
    stream: Option<ByteStream>,
    buffer: BytesMut,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for ContinuousChanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuousChanges")
            .field("active", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl ContinuousChanges {
    pub(crate) fn new(response: RawResponse) -> Self {
        Self {
            stream: Some(response.into_stream()),
            buffer: BytesMut::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Pull the next change row.
    ///
    /// Blocks until a row arrives, the feed terminates (`None`), or a
    /// read/parse failure occurs (`Some(Err(..))`, after which the feed is
    /// terminated and later calls return `None`).
    pub async fn next(&mut self) -> Option<Result<ChangeRow>> {
        if self.stream.is_none() {
            return None;
        }
        loop {
            // Stop flag observed at each iteration boundary, before the
            // stream is touched again.
            if self.stop.load(Ordering::Relaxed) {
                self.terminate();
                return None;
            }

            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    // heartbeat
                    continue;
                }
                if line.starts_with(LAST_SEQ_PREFIX) {
                    self.terminate();
                    return None;
                }
                return Some(self.parse_row(&line));
            }

            let chunk = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => return None,
            };
            match chunk {
                Some(Ok(data)) => self.buffer.extend_from_slice(&data),
                Some(Err(e)) => {
                    self.terminate();
                    return Some(Err(CouchError::Feed(e.to_string())));
                }
                None => {
                    // Server closed the feed; a final unterminated line may
                    // still sit in the buffer.
                    let tail = self.take_tail();
                    self.terminate();
                    if tail.is_empty() || tail.starts_with(LAST_SEQ_PREFIX) {
                        return None;
                    }
                    return Some(self.parse_row(&tail));
                }
            }
        }
    }

    /// Request termination; observed at the next [`ContinuousChanges::next`]
    /// call. An in-progress read is not interrupted.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// A cloneable [`StopHandle`] for requesting termination from another
    /// task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Whether the feed has terminated and released its connection.
    pub fn is_stopped(&self) -> bool {
        self.stream.is_none()
    }

    /// Adapt the feed into a [`Stream`] of rows for use with `StreamExt`
    /// combinators.
    ///
    /// A background task pumps the feed; dropping the returned stream stops
    /// the pump at the next row boundary.
    pub fn into_stream(mut self) -> ChangesStream {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(item) = self.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        ChangesStream {
            receiver: ReceiverStream::new(rx),
        }
    }

    fn take_line(&mut self) -> Option<Bytes> {
        let position = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(position + 1);
        line.truncate(position);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }

    fn take_tail(&mut self) -> Bytes {
        let mut tail = self.buffer.split();
        if tail.last() == Some(&b'\r') {
            tail.truncate(tail.len() - 1);
        }
        tail.freeze()
    }

    fn parse_row(&mut self, line: &[u8]) -> Result<ChangeRow> {
        match serde_json::from_slice(line) {
            Ok(row) => Ok(row),
            Err(e) => {
                self.terminate();
                Err(CouchError::Feed(format!("malformed change row: {e}")))
            }
        }
    }

    /// Drop the response body, exactly once. Idempotent: every termination
    /// path funnels through here, and repeat calls find nothing to close.
    fn terminate(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.buffer.clear();
            tracing::debug!("continuous changes feed terminated");
        }
    }
}

/// [`Stream`] adapter over a [`ContinuousChanges`] feed.
pub struct ChangesStream {
    receiver: ReceiverStream<Result<ChangeRow>>,
}

impl Stream for ChangesStream {
    type Item = Result<ChangeRow>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}
