//! Transport seam: the capability trait and its `reqwest` implementation.
//!
//! [`Transport`] is the one injection point of the client. Everything above it
//! works in terms of [`HttpRequest`] and [`RawResponse`], so an alternative
//! HTTP stack (or a test double) can be supplied at construction via
//! [`CouchClient::with_transport`](crate::CouchClient::with_transport).
//!
//! [`HttpTransport`] is the default implementation. It owns a
//! [`reqwest::Client`] built once at construction; each executed request
//! checks one connection out of its pool, and the connection is released when
//! the response body has been drained or dropped. A transport-level failure
//! tears the in-flight exchange down before the error is returned, so a
//! failed call never leaks a pooled connection.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{header, Method, StatusCode};
use url::Url;

use crate::client::config::CouchConfig;
use crate::error::{CouchError, Result};

/// A boxed stream of response body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Body payload attached to a write request.
pub enum RequestBody {
    /// Fully buffered payload.
    Bytes(Bytes),
    /// Streaming payload, handed to the transport unbuffered.
    Stream(ByteStream),
}

impl From<Bytes> for RequestBody {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(data.into())
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(data: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(data))
    }
}

impl From<&'static str> for RequestBody {
    fn from(data: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(data.as_bytes()))
    }
}

impl From<ByteStream> for RequestBody {
    fn from(stream: ByteStream) -> Self {
        Self::Stream(stream)
    }
}

/// One request handed to the [`Transport`].
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Whether to send `Accept: application/json`.
    pub accept_json: bool,
    /// Content type of the body, when a body is present.
    pub content_type: Option<String>,
    /// Precomputed `Authorization` header value.
    pub authorization: Option<String>,
    /// Request body.
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// Create a request with JSON acceptance on and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            accept_json: true,
            content_type: None,
            authorization: None,
            body: None,
        }
    }
}

/// A response as produced by the [`Transport`]: status plus an unconsumed
/// byte stream.
///
/// The stream holds the pooled connection; it must be drained
/// ([`RawResponse::bytes`]/[`RawResponse::text`]) or taken over by the caller
/// ([`RawResponse::into_stream`]) on every path.
pub struct RawResponse {
    status: StatusCode,
    stream: ByteStream,
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl RawResponse {
    /// Wrap a status code and body stream.
    pub fn new(status: StatusCode, stream: ByteStream) -> Self {
        Self { status, stream }
    }

    /// The response status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Drain the body fully into one buffer.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Drain the body fully and decode it as UTF-8 text.
    pub async fn text(self) -> Result<String> {
        let body = self.bytes().await?;
        String::from_utf8(body.to_vec()).map_err(|e| CouchError::Decode(e.to_string()))
    }

    /// Hand the raw body stream to the caller. The caller owns dropping it.
    pub fn into_stream(self) -> ByteStream {
        self.stream
    }
}

/// Capability interface for HTTP request execution.
///
/// Implementations send exactly one request per call and never retry. On
/// failure the in-flight exchange must be torn down before the error is
/// returned.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request and expose the response as a status plus body
    /// stream.
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse>;
}

/// Default [`Transport`] over a pooled [`reqwest::Client`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport with the pool settings from `config`.
    pub fn new(config: &CouchConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse> {
        let mut builder = self.client.request(request.method, request.url);
        if request.accept_json {
            builder = builder.header(header::ACCEPT, crate::protocol::APPLICATION_JSON);
        }
        if let Some(content_type) = request.content_type.as_deref() {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(authorization) = request.authorization.as_deref() {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        if let Some(body) = request.body {
            builder = match body {
                RequestBody::Bytes(data) => builder.body(data),
                RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
            };
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CouchError::Transport(e.to_string()))?;

        let status = response.status();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| CouchError::Transport(e.to_string())))
            .boxed();
        Ok(RawResponse::new(status, stream))
    }
}
