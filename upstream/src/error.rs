use serde_json::Value as JsonValue;

/// An upstream answered, but reported failure: either an HTTP status of 400 or
/// above, or an envelope with `success: false`.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("upstream responded with status {status}: {message}")]
pub struct ExternalApiError {
    pub status: u16,
    pub message: String,
    /// The decoded response body, kept for product-catalog responses so the
    /// caller can log what the upstream sent back.
    pub body: Option<JsonValue>,
}

impl ExternalApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("request to {upstream} failed: {source}")]
    Transport {
        upstream: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {0} timed out")]
    Timeout(&'static str),

    #[error("could not parse upstream response: {0}")]
    Parse(String),

    #[error(transparent)]
    External(#[from] ExternalApiError),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl UpstreamError {
    pub(crate) fn from_reqwest(upstream: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(upstream)
        } else {
            UpstreamError::Transport {
                upstream,
                source: err,
            }
        }
    }

    /// HTTP status reported by the upstream, if it answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            UpstreamError::External(e) => Some(e.status),
            _ => None,
        }
    }
}
