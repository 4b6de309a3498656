use crate::csv_reader::CsvError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use upstream::UpstreamError;

/// Status used by the data partner to signal that it cannot serve requests.
const PARTNER_UNAVAILABLE_STATUS: u16 = 512;
const PARTNER_UNAVAILABLE_MESSAGE: &str = "The data partner service is currently unavailable.";

/// Errors reported to API clients. Each kind maps to exactly one HTTP status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    TooMany(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    GatewayTimeout(String),

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooMany(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unknown(_) => StatusCode::from_u16(PARTNER_UNAVAILABLE_STATUS)
                .unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::Unprocessable(m)
            | ApiError::TooMany(m)
            | ApiError::Internal(m)
            | ApiError::BadGateway(m)
            | ApiError::ServiceUnavailable(m)
            | ApiError::GatewayTimeout(m)
            | ApiError::Unknown(m) => m,
        }
    }

    /// Translates a failed login against the core service.
    pub fn from_login_failure(err: UpstreamError) -> Self {
        match &err {
            UpstreamError::External(e) if e.status == 401 => {
                if e.message.contains("not Active") {
                    ApiError::Unauthorized("your account is not active".to_string())
                } else {
                    ApiError::Unauthorized("email or password is incorrect".to_string())
                }
            }
            _ => err.into(),
        }
    }

    /// Translates a failed password change against the core service.
    pub fn from_password_change_failure(err: UpstreamError) -> Self {
        match &err {
            UpstreamError::External(e)
                if e.message.contains("hashedPassword is not the hash of the given password") =>
            {
                ApiError::BadRequest("current password is wrong".to_string())
            }
            _ => err.into(),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::External(e) => {
                let message = e.message;
                match e.status {
                    400 => ApiError::BadRequest(message),
                    401 => ApiError::Unauthorized(message),
                    403 => ApiError::Forbidden(message),
                    404 => ApiError::NotFound(message),
                    409 => ApiError::Conflict(message),
                    422 => ApiError::Unprocessable(message),
                    429 => ApiError::TooMany(message),
                    503 => ApiError::ServiceUnavailable(message),
                    504 => ApiError::GatewayTimeout(message),
                    PARTNER_UNAVAILABLE_STATUS => {
                        ApiError::Unknown(PARTNER_UNAVAILABLE_MESSAGE.to_string())
                    }
                    _ => ApiError::BadGateway(message),
                }
            }
            UpstreamError::Timeout(upstream) => {
                ApiError::GatewayTimeout(format!("request to {upstream} timed out"))
            }
            UpstreamError::Transport { upstream, .. } => {
                ApiError::BadGateway(format!("{upstream} is unreachable"))
            }
            UpstreamError::Parse(_) => {
                ApiError::BadGateway("upstream returned an invalid response".to_string())
            }
            UpstreamError::InvalidUrl(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CsvError> for ApiError {
    fn from(err: CsvError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[derive(Serialize)]
struct ApiErrorResponse<'a> {
    success: bool,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = Json(ApiErrorResponse {
            success: false,
            message: self.message(),
        });

        (status, body).into_response()
    }
}
