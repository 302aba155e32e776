//! Response interpretation: status classification and body decoding.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::client::transport::RawResponse;
use crate::error::{CouchError, Result};

/// Classify a response by status code.
///
/// 200/201/202 pass the response through untouched; 404 and 409 map to the
/// document outcomes; anything else fails with the status reason plus the
/// full body text. On every failure path the body is drained first so the
/// pooled connection is released in a reusable state.
pub(crate) async fn interpret(response: RawResponse) -> Result<RawResponse> {
    let status = response.status();
    if matches!(
        status,
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED
    ) {
        return Ok(response);
    }

    let reason = status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), %reason, "request rejected");

    match status {
        StatusCode::NOT_FOUND => Err(CouchError::NotFound(reason)),
        StatusCode::CONFLICT => Err(CouchError::Conflict(reason)),
        _ => Err(CouchError::Status {
            status: status.as_u16(),
            reason: if body.is_empty() {
                reason
            } else {
                format!("{reason}: {body}")
            },
        }),
    }
}

/// Drain the body and decode it as JSON into `T`.
pub(crate) async fn decode<T: DeserializeOwned>(response: RawResponse) -> Result<T> {
    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
