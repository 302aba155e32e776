//! The client itself: request execution and document operations.
//!
//! [`CouchClient`] owns the immutable connection context (base and database
//! URLs, precomputed credentials) and the injected [`Transport`]. Every
//! document operation builds one request, executes it, and interprets the
//! response; nothing is retried and nothing is cached.
//!
//! Identifier/revision invariants are enforced before any request is issued:
//! a create must not carry a revision, an update or delete must carry both
//! identifier and revision. Violations fail with
//! [`CouchError::Precondition`](crate::CouchError::Precondition) without
//! touching the network.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::client::config::CouchConfig;
use crate::client::response;
use crate::client::transport::{
    ByteStream, HttpRequest, HttpTransport, RawResponse, RequestBody, Transport,
};
use crate::error::{CouchError, Result};
use crate::protocol::{self, params, paths, APPLICATION_JSON};
use crate::types::{BulkEnvelope, WriteResult};

/// Asynchronous client for one database over HTTP.
///
/// The client is cheap to clone and immutable after construction; concurrent
/// calls are independent, each checking its own connection out of the
/// transport's pool.
///
/// # Examples
///
/// ```no_run
/// use feathercouch::{CouchClient, CouchConfig};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> feathercouch::Result<()> {
/// let client = CouchClient::new(CouchConfig::new("127.0.0.1", 5984, "inventory"))?;
/// let saved = client.save(&json!({ "sku": "bolt-m4", "stock": 40 })).await?;
/// println!("created {} at revision {}", saved.id, saved.rev);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CouchClient {
    config: CouchConfig,
    transport: Arc<dyn Transport>,
    base_url: Url,
    db_url: Url,
    authorization: Option<String>,
}

impl CouchClient {
    /// Create a client over the default [`HttpTransport`].
    pub fn new(config: CouchConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::with_transport(config, transport)
    }

    /// Create a client over a caller-supplied [`Transport`].
    pub fn with_transport(config: CouchConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let base_url = config.base_url()?;
        let db_url = config.database_url()?;
        let authorization = config.basic_authorization();
        Ok(Self {
            config,
            transport,
            base_url,
            db_url,
            authorization,
        })
    }

    /// The connection context this client was built from.
    pub fn config(&self) -> &CouchConfig {
        &self.config
    }

    /// The server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The database URL document operations are issued under.
    pub fn database_url(&self) -> &Url {
        &self.db_url
    }

    // ---- request execution ----

    /// Execute one request through the transport, attaching configured
    /// credentials.
    ///
    /// The returned response holds a pooled connection until its body is
    /// drained or dropped.
    pub async fn execute(&self, mut request: HttpRequest) -> Result<RawResponse> {
        if request.authorization.is_none() {
            request.authorization = self.authorization.clone();
        }
        tracing::debug!(method = %request.method, url = %request.url, "executing request");
        self.transport.execute(request).await
    }

    /// GET `url` and return the classified response.
    pub(crate) async fn get_response(&self, url: Url) -> Result<RawResponse> {
        let request = HttpRequest::new(Method::GET, url);
        let response = self.execute(request).await?;
        response::interpret(response).await
    }

    /// GET `url` and decode the body as `T`.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.get_response(url).await?;
        response::decode(response).await
    }

    async fn put_json(&self, url: Url, payload: Vec<u8>) -> Result<WriteResult> {
        let mut request = HttpRequest::new(Method::PUT, url);
        request.content_type = Some(APPLICATION_JSON.to_string());
        request.body = Some(RequestBody::Bytes(payload.into()));
        let response = self.execute(request).await?;
        response::decode(response::interpret(response).await?).await
    }

    pub(crate) async fn post_json(&self, url: Url, payload: Vec<u8>) -> Result<RawResponse> {
        let mut request = HttpRequest::new(Method::POST, url);
        request.content_type = Some(APPLICATION_JSON.to_string());
        request.body = Some(RequestBody::Bytes(payload.into()));
        let response = self.execute(request).await?;
        response::interpret(response).await
    }

    async fn delete_json(&self, url: Url) -> Result<WriteResult> {
        let request = HttpRequest::new(Method::DELETE, url);
        let response = self.execute(request).await?;
        response::decode(response::interpret(response).await?).await
    }

    // ---- reads ----

    /// Fetch the document `id` and decode it as `T`.
    pub async fn find<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        ensure_not_empty(id, "id")?;
        self.get_json(protocol::join(&self.db_url, &[id])).await
    }

    /// Fetch the document `id` with extra query parameters.
    pub async fn find_with_params<T: DeserializeOwned>(
        &self,
        id: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        ensure_not_empty(id, "id")?;
        let mut url = protocol::join(&self.db_url, &[id]);
        for &(key, value) in query {
            protocol::append_query(&mut url, key, value);
        }
        self.get_json(url).await
    }

    /// Fetch a specific revision of the document `id`.
    pub async fn find_rev<T: DeserializeOwned>(&self, id: &str, rev: &str) -> Result<T> {
        ensure_not_empty(rev, "rev")?;
        self.find_with_params(id, &[(params::REV, rev)]).await
    }

    /// Fetch an arbitrary absolute URL and decode the body as `T`.
    pub async fn find_any<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.get_json(url).await
    }

    /// Fetch the document `id` as a raw byte stream.
    ///
    /// The caller owns the stream; the pooled connection is released when the
    /// stream is drained or dropped.
    pub async fn find_raw(&self, id: &str) -> Result<ByteStream> {
        ensure_not_empty(id, "id")?;
        let url = protocol::join(&self.db_url, &[id]);
        Ok(self.get_response(url).await?.into_stream())
    }

    /// Fetch a specific revision of the document `id` as a raw byte stream.
    pub async fn find_raw_rev(&self, id: &str, rev: &str) -> Result<ByteStream> {
        ensure_not_empty(id, "id")?;
        ensure_not_empty(rev, "rev")?;
        let mut url = protocol::join(&self.db_url, &[id]);
        protocol::append_query(&mut url, params::REV, rev);
        Ok(self.get_response(url).await?.into_stream())
    }

    /// Fetch the attachment `name` of document `doc_id` as a raw byte stream.
    ///
    /// The caller owns the stream, as with [`CouchClient::find_raw`].
    pub async fn find_attachment(&self, doc_id: &str, name: &str) -> Result<ByteStream> {
        ensure_not_empty(doc_id, "document id")?;
        ensure_not_empty(name, "name")?;
        let url = protocol::join(&self.db_url, &[doc_id, name]);
        Ok(self.get_response(url).await?.into_stream())
    }

    /// Probe whether the document `id` exists.
    ///
    /// A 404 answer is translated to `Ok(false)`; every other failure
    /// propagates.
    pub async fn contains(&self, id: &str) -> Result<bool> {
        ensure_not_empty(id, "id")?;
        let request = HttpRequest::new(Method::HEAD, protocol::join(&self.db_url, &[id]));
        let response = self.execute(request).await?;
        match response::interpret(response).await {
            Ok(response) => {
                let _ = response.bytes().await;
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Query the declarative-find endpoint and decode each matched document
    /// as `T`.
    ///
    /// The response envelope's `docs` array is unwrapped; one malformed
    /// element fails the whole call.
    pub async fn find_docs<Q, T>(&self, query: &Q) -> Result<Vec<T>>
    where
        Q: Serialize,
        T: DeserializeOwned,
    {
        let url = protocol::join(&self.db_url, &[paths::FIND]);
        let response = self.post_json(url, serde_json::to_vec(query)?).await?;
        let envelope: Value = response::decode(response).await?;
        let docs = envelope
            .get("docs")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CouchError::Decode("query response is missing a docs array".to_string())
            })?;
        docs.iter()
            .map(|doc| serde_json::from_value(doc.clone()).map_err(CouchError::from))
            .collect()
    }

    // ---- writes ----

    /// Create a document.
    ///
    /// The value must not carry a `_rev`; when `_id` is absent a fresh
    /// identifier is generated client-side, avoiding a round trip for id
    /// allocation.
    pub async fn save<T: Serialize>(&self, doc: &T) -> Result<WriteResult> {
        self.put_document(doc, true).await
    }

    /// Update a document. The value must carry both `_id` and `_rev`.
    pub async fn update<T: Serialize>(&self, doc: &T) -> Result<WriteResult> {
        self.put_document(doc, false).await
    }

    async fn put_document<T: Serialize>(&self, doc: &T, create: bool) -> Result<WriteResult> {
        let json = serde_json::to_value(doc)?;
        let object = json.as_object().ok_or_else(|| {
            CouchError::Precondition("document must serialize to a JSON object".to_string())
        })?;
        let id = object.get("_id").and_then(Value::as_str);
        let rev = object.get("_rev").and_then(Value::as_str);

        let id = if create {
            if object.get("_rev").is_some() {
                return Err(CouchError::Precondition(
                    "a document being created may not carry a revision".to_string(),
                ));
            }
            match id {
                Some(id) if !id.trim().is_empty() => id.to_string(),
                _ => generate_id(),
            }
        } else {
            let id = id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
                CouchError::Precondition("update requires an _id".to_string())
            })?;
            if rev.filter(|rev| !rev.trim().is_empty()).is_none() {
                return Err(CouchError::Precondition(
                    "update requires a _rev".to_string(),
                ));
            }
            id.to_string()
        };

        let url = protocol::join(&self.db_url, &[&id]);
        self.put_json(url, serde_json::to_vec(&json)?).await
    }

    /// Create a document with a server-assigned identifier.
    pub async fn post<T: Serialize>(&self, doc: &T) -> Result<WriteResult> {
        let response = self
            .post_json(self.db_url.clone(), serde_json::to_vec(doc)?)
            .await?;
        response::decode(response).await
    }

    /// Save a document in deferred-write (`batch=ok`) mode. The server
    /// acknowledges without durability; no write result is returned.
    pub async fn save_batch<T: Serialize>(&self, doc: &T) -> Result<()> {
        let mut url = self.db_url.clone();
        protocol::append_query(&mut url, params::BATCH, "ok");
        let response = self.post_json(url, serde_json::to_vec(doc)?).await?;
        response.bytes().await?;
        Ok(())
    }

    /// Delete the document described by `doc`, which must carry `_id` and
    /// `_rev`.
    pub async fn remove<T: Serialize>(&self, doc: &T) -> Result<WriteResult> {
        let json = serde_json::to_value(doc)?;
        let id = json.get("_id").and_then(Value::as_str);
        let rev = json.get("_rev").and_then(Value::as_str);
        match (id, rev) {
            (Some(id), Some(rev)) => self.remove_by_id(id, rev).await,
            _ => Err(CouchError::Precondition(
                "remove requires both _id and _rev".to_string(),
            )),
        }
    }

    /// Delete document `id` at revision `rev`.
    pub async fn remove_by_id(&self, id: &str, rev: &str) -> Result<WriteResult> {
        ensure_not_empty(id, "id")?;
        ensure_not_empty(rev, "rev")?;
        let mut url = protocol::join(&self.db_url, &[id]);
        protocol::append_query(&mut url, params::REV, rev);
        self.delete_json(url).await
    }

    /// Create and update many documents in one request.
    ///
    /// With `new_edits` false the server accepts the supplied revision
    /// history verbatim (replication-style writes). The returned results are
    /// in input order; a rejected item never fails the call, so each entry's
    /// [`WriteResult::succeeded`] must be inspected individually.
    pub async fn bulk<T: Serialize>(&self, docs: &[T], new_edits: bool) -> Result<Vec<WriteResult>> {
        if docs.is_empty() {
            return Err(CouchError::Precondition(
                "bulk requires at least one document".to_string(),
            ));
        }
        let envelope = BulkEnvelope { new_edits, docs };
        let url = protocol::join(&self.db_url, &[paths::BULK_DOCS]);
        let response = self.post_json(url, serde_json::to_vec(&envelope)?).await?;
        response::decode(response).await
    }

    /// Upload an attachment.
    ///
    /// With `doc_id` present the attachment is stored under that document
    /// (`doc_rev` proving the observed revision); with `doc_id` absent a new
    /// container document is created under a generated identifier. The body
    /// may be buffered bytes or an unbuffered stream (see [`RequestBody`]).
    pub async fn save_attachment(
        &self,
        body: impl Into<RequestBody>,
        name: &str,
        content_type: &str,
        doc_id: Option<&str>,
        doc_rev: Option<&str>,
    ) -> Result<WriteResult> {
        ensure_not_empty(name, "name")?;
        ensure_not_empty(content_type, "content type")?;
        let owner = match doc_id {
            Some(id) => {
                ensure_not_empty(id, "document id")?;
                id.to_string()
            }
            None => generate_id(),
        };
        let mut url = protocol::join(&self.db_url, &[&owner, name]);
        if let Some(rev) = doc_rev {
            protocol::append_query(&mut url, params::REV, rev);
        }
        let mut request = HttpRequest::new(Method::PUT, url);
        request.content_type = Some(content_type.to_string());
        request.body = Some(body.into());
        let response = self.execute(request).await?;
        response::decode(response::interpret(response).await?).await
    }
}

/// Generate a fresh document identifier (random UUID, compact form).
fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CouchError::Precondition(format!("{field} may not be empty")));
    }
    Ok(())
}
