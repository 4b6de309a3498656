//! Response envelopes of the three upstream services and the parser that
//! classifies them.
//!
//! Every upstream wraps its payload in an envelope carrying `success` and
//! `message`. The parser reads the body fully, decodes the envelope, attaches
//! the HTTP status and then decides:
//!
//! - status >= 400 or `success == false` → [`ExternalApiError`] with that status
//!   and the upstream message (plus the decoded body for product-catalog
//!   responses);
//! - anything else → the envelope.
//!
//! An empty 2xx body and undecodable JSON are parse errors; the raw body is
//! included (bounded) in the message of the latter.

use crate::error::{ExternalApiError, UpstreamError};
use crate::metrics_defs::UPSTREAM_REQUEST_DURATION;
use reqwest::StatusCode;
use shared::histogram;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;

/// Upper bound on how much of an undecodable body ends up in an error message.
const MAX_BODY_IN_ERROR: usize = 512;

pub trait Envelope: DeserializeOwned {
    /// Keep the decoded body on [`ExternalApiError`] so it can be written to a
    /// transaction log.
    const RETAIN_BODY_ON_ERROR: bool = false;

    fn is_success(&self) -> bool;

    fn message(&self) -> &str;

    fn set_status_code(&mut self, status: u16);
}

/// Pagination metadata returned by list endpoints of the core service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub total_pages: i64,
    #[serde(default)]
    pub total_data: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip)]
    pub status_code: u16,
}

impl<T> CoreEnvelope<T> {
    /// The payload of a successful envelope; a success without data is a parse error.
    pub fn into_data(self) -> Result<T, UpstreamError> {
        self.data
            .ok_or_else(|| UpstreamError::Parse("successful response without data".to_string()))
    }
}

impl<T: DeserializeOwned> Envelope for CoreEnvelope<T> {
    fn is_success(&self) -> bool {
        self.success
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn set_status_code(&mut self, status: u16) {
        self.status_code = status;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub input: JsonValue,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub pricing_strategy: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub datetime: String,
    #[serde(skip)]
    pub status_code: u16,
}

impl<T: DeserializeOwned> Envelope for CatalogEnvelope<T> {
    const RETAIN_BODY_ON_ERROR: bool = true;

    fn is_success(&self) -> bool {
        self.success
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn set_status_code(&mut self, status: u16) {
        self.status_code = status;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip)]
    pub status_code: u16,
}

impl<T: DeserializeOwned> Envelope for ScoringEnvelope<T> {
    fn is_success(&self) -> bool {
        self.success
    }

    // The scoring service puts the useful text in `error_message` on failures.
    fn message(&self) -> &str {
        match self.error_message.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => &self.message,
        }
    }

    fn set_status_code(&mut self, status: u16) {
        self.status_code = status;
    }
}

/// Decodes and classifies an upstream response body.
pub fn parse_envelope<E: Envelope>(status: StatusCode, body: &[u8]) -> Result<E, UpstreamError> {
    let is_error_status = status.as_u16() >= 400;

    if body.iter().all(u8::is_ascii_whitespace) {
        if is_error_status {
            return Err(ExternalApiError::new(status.as_u16(), fallback_message(status)).into());
        }
        return Err(UpstreamError::Parse(format!(
            "empty response body with status {status}"
        )));
    }

    let mut envelope = match serde_json::from_slice::<E>(body) {
        Ok(envelope) => envelope,
        // A failing upstream that does not speak the envelope is still a failing upstream.
        Err(_) if is_error_status => {
            return Err(ExternalApiError::new(status.as_u16(), fallback_message(status)).into());
        }
        Err(e) => {
            return Err(UpstreamError::Parse(format!(
                "{e}; body: {}",
                bounded_body(body)
            )));
        }
    };
    envelope.set_status_code(status.as_u16());

    if is_error_status || !envelope.is_success() {
        let message = match envelope.message() {
            "" => fallback_message(status),
            m => m.to_string(),
        };
        let body = if E::RETAIN_BODY_ON_ERROR {
            serde_json::from_slice::<JsonValue>(body).ok()
        } else {
            None
        };
        return Err(ExternalApiError {
            status: status.as_u16(),
            message,
            body,
        }
        .into());
    }

    Ok(envelope)
}

/// Reads the whole response body and runs it through [`parse_envelope`].
pub async fn read_envelope<E: Envelope>(
    upstream: &'static str,
    response: reqwest::Response,
) -> Result<E, UpstreamError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| UpstreamError::from_reqwest(upstream, e))?;

    parse_envelope(status, &body)
}

/// Sends `request`, records its duration and reads the envelope.
pub(crate) async fn send_envelope<E: Envelope>(
    upstream: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<E, UpstreamError> {
    let started = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            histogram!(UPSTREAM_REQUEST_DURATION, "upstream" => upstream, "status" => "error")
                .record(started.elapsed().as_secs_f64());
            return Err(UpstreamError::from_reqwest(upstream, e));
        }
    };

    histogram!(
        UPSTREAM_REQUEST_DURATION,
        "upstream" => upstream,
        "status" => response.status().as_str().to_string()
    )
    .record(started.elapsed().as_secs_f64());

    read_envelope(upstream, response).await
}

fn fallback_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason.to_string(),
        None => format!("upstream responded with status {}", status.as_u16()),
    }
}

fn bounded_body(body: &[u8]) -> String {
    let end = body.len().min(MAX_BODY_IN_ERROR);
    let mut text = String::from_utf8_lossy(&body[..end]).into_owned();
    if body.len() > MAX_BODY_IN_ERROR {
        text.push_str("...");
    }
    text
}
