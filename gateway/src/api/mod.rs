//! Client-facing HTTP API.

mod products;

use crate::auth::{AuthContext, SessionVerifier};
use crate::config::{AuthConfig, BulkConfig};
use crate::dispatcher::{BulkDispatcher, BulkSettings};
use crate::errors::ApiError;
use crate::executor::SingleExecutor;
use crate::export::Exporter;
use axum::extract::{DefaultBodyLimit, FromRequestParts};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use upstream::envelope::Meta;
use upstream::{CoreApi, ProductApi};

/// Room for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    core: Arc<dyn CoreApi>,
    dispatcher: Arc<BulkDispatcher>,
    executor: Arc<SingleExecutor>,
    exporter: Arc<Exporter>,
    sessions: Arc<SessionVerifier>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        core: Arc<dyn CoreApi>,
        products: Arc<dyn ProductApi>,
        bulk: &BulkConfig,
        auth: &AuthConfig,
    ) -> Self {
        AppState {
            dispatcher: Arc::new(BulkDispatcher::new(
                core.clone(),
                products.clone(),
                BulkSettings::from(bulk),
            )),
            executor: Arc::new(SingleExecutor::new(core.clone(), products)),
            exporter: Arc::new(Exporter::new(core.clone())),
            sessions: Arc::new(SessionVerifier::new(
                &auth.session_secret,
                auth.cookie_name.clone(),
            )),
            max_upload_bytes: bulk.max_upload_bytes,
            core,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/products/{slug}/bulk", post(products::bulk))
        .route("/api/products/{slug}/single", post(products::single))
        .route("/api/products/{slug}/jobs", get(products::list_jobs))
        .route("/api/products/{slug}/jobs/{job_id}", get(products::job_details))
        .route(
            "/api/products/{slug}/jobs/{job_id}/export",
            get(products::export_job),
        )
        .route(
            "/api/products/{slug}/jobs-summary/export",
            get(products::export_summary),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("route not found".to_string())
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state.sessions.verify(&parts.headers)
    }
}

/// Success envelope: `{success, message, data, meta?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    message: String,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: Option<T>) -> Self {
        ApiResponse {
            success: true,
            message: message.into(),
            data,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Option<Meta>) -> Self {
        self.meta = meta;
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
