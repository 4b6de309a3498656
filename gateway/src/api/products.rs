use super::{ApiResponse, AppState};
use crate::auth::AuthContext;
use crate::csv_reader;
use crate::dispatcher::BulkSummary;
use crate::errors::ApiError;
use crate::export::{CsvExport, ExportRequest, ExportTarget};
use crate::products::Product;
use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use upstream::types::{Job, JobDetail, JobDetailFilter, JobListFilter};

const UPLOAD_FIELD: &str = "file";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Default, Deserialize)]
pub(super) struct JobExportQuery {
    #[serde(default)]
    masked: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SummaryExportQuery {
    start_date: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    masked: bool,
}

fn product(slug: &str) -> Result<Product, ApiError> {
    Product::from_slug(slug).ok_or_else(|| ApiError::NotFound("product not found".to_string()))
}

fn job_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("invalid job id".to_string()))
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn bad_multipart(err: MultipartError) -> ApiError {
    ApiError::BadRequest(err.body_text())
}

fn date(raw: Option<String>, name: &str) -> Result<String, ApiError> {
    let raw = raw
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|_| ApiError::BadRequest(format!("{name} must be formatted as YYYY-MM-DD")))?;
    Ok(raw)
}

fn attachment(export: CsvExport) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", export.filename),
            ),
        ],
        export.body,
    )
        .into_response()
}

pub(super) async fn bulk(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<BulkSummary>, ApiError> {
    let product = product(&slug)?;
    let mut multipart =
        multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(bad_multipart)?;
        upload = Some((file_name, data));
        break;
    }
    let (file_name, data) =
        upload.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;
    csv_reader::check_upload(&file_name, data.len(), state.max_upload_bytes)?;

    let summary = state.dispatcher.dispatch(&auth, product, &data).await?;
    Ok(ApiResponse::ok("bulk request processed", Some(summary)))
}

pub(super) async fn single(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    body: Bytes,
) -> Result<ApiResponse<JsonValue>, ApiError> {
    let product = product(&slug)?;
    let body: JsonValue = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;

    let response = state.executor.execute(&auth, product, &body).await?;
    Ok(ApiResponse::ok(
        response.message().to_string(),
        response.data().cloned(),
    ))
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    filter: Result<Query<JobListFilter>, QueryRejection>,
) -> Result<ApiResponse<Vec<Job>>, ApiError> {
    let product = product(&slug)?;
    let filter = query(filter)?;

    let envelope = state
        .core
        .list_jobs(&auth.scope(), product.slug(), &filter)
        .await?;
    Ok(ApiResponse::ok(envelope.message, envelope.data).with_meta(envelope.meta))
}

pub(super) async fn job_details(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, raw_job_id)): Path<(String, String)>,
    filter: Result<Query<JobDetailFilter>, QueryRejection>,
) -> Result<ApiResponse<Vec<JobDetail>>, ApiError> {
    let product = product(&slug)?;
    let job_id = job_id(&raw_job_id)?;
    let filter = query(filter)?;

    let envelope = state
        .core
        .job_details(&auth.scope(), product.slug(), job_id, &filter)
        .await?;
    Ok(ApiResponse::ok(envelope.message, envelope.data).with_meta(envelope.meta))
}

pub(super) async fn export_job(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, raw_job_id)): Path<(String, String)>,
    params: Result<Query<JobExportQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let request = ExportRequest {
        product: product(&slug)?,
        target: ExportTarget::Job(job_id(&raw_job_id)?),
        masked: query(params)?.masked,
    };
    let export = state.exporter.export(&auth, &request).await?;
    Ok(attachment(export))
}

pub(super) async fn export_summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    params: Result<Query<SummaryExportQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let product = product(&slug)?;
    let params = query(params)?;
    let start_date = date(params.start_date, "start_date")?;
    let end_date = date(params.end_date, "end_date")?;
    // Both are validated YYYY-MM-DD, so string order is date order.
    if start_date > end_date {
        return Err(ApiError::BadRequest(
            "start_date must not be after end_date".to_string(),
        ));
    }

    let request = ExportRequest {
        product,
        target: ExportTarget::DateRange {
            start_date,
            end_date,
        },
        masked: params.masked,
    };
    let export = state.exporter.export(&auth, &request).await?;
    Ok(attachment(export))
}
