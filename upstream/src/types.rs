//! Wire types exchanged with the core service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Headers identifying the caller on scoped reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberScope {
    pub member_id: u64,
    pub company_id: u64,
    pub tier_level: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    #[serde(default)]
    pub product_group_id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribedProduct {
    #[serde(alias = "id")]
    pub subscribed_product_id: u64,
    pub product_id: u64,
    pub product: ProductInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaQuery {
    pub member_id: u64,
    pub company_id: u64,
    pub subscribed_id: u64,
    pub quota_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub quota: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    #[serde(default)]
    pub id: u64,
    pub grade: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateJobRequest {
    pub product_id: u64,
    pub member_id: u64,
    pub company_id: u64,
    pub total: u64,
}

/// Reference to a job returned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub id: u64,
    pub member_id: u64,
    pub company_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateJobRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_count: Option<u64>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedCount {
    pub processed_count: u64,
}

/// A job as listed by the core service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    #[serde(default)]
    pub product_id: u64,
    #[serde(default)]
    pub member_id: u64,
    #[serde(default)]
    pub company_id: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub success_count: u64,
    pub status: JobStatus,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

/// One per-attempt record in the product-catalog transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLog {
    pub transaction_id: String,
    pub job_id: u64,
    pub member_id: u64,
    pub company_id: u64,
    pub product_id: u64,
    pub product_group_id: u64,
    pub status: u16,
    pub success: bool,
    pub message: String,
    pub input: JsonValue,
    /// The upstream envelope (input and datetime included) when one was received.
    pub output: Option<JsonValue>,
    /// Product-specific result fields.
    pub data: Option<JsonValue>,
    pub request_time: DateTime<Utc>,
    pub response_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobListFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetailFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummaryFilter {
    pub start_date: String,
    pub end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// Input fields a job detail row may carry, across all products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nik: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub npwp: Option<String>,
    #[serde(default)]
    pub npwp_or_nik: Option<String>,
    #[serde(default)]
    pub loan_no: Option<String>,
}

/// Result fields a job detail row may carry, across all products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailData {
    #[serde(default, alias = "nama")]
    pub name: Option<String>,
    #[serde(default, alias = "alamat")]
    pub address: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub query_count: Option<JsonValue>,
    #[serde(default)]
    pub score: Option<JsonValue>,
    #[serde(default)]
    pub npwp_verification: Option<String>,
    #[serde(default)]
    pub tax_compliance: Option<String>,
    #[serde(default)]
    pub live_status: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub phone_type: Option<String>,
    #[serde(default)]
    pub probability_to_default: Option<JsonValue>,
    #[serde(default)]
    pub grade: Option<String>,
}

/// Snapshot of the product-catalog transaction with sensitive input already masked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefTransProductCatalog {
    #[serde(default)]
    pub input: DetailInput,
    #[serde(default)]
    pub data: Option<DetailData>,
}

/// One row of a job's detail listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    #[serde(default)]
    pub job_id: u64,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub input: DetailInput,
    #[serde(default)]
    pub data: Option<DetailData>,
    #[serde(default)]
    pub ref_trans_product_catalog: Option<RefTransProductCatalog>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
