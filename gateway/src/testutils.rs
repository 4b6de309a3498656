//! In-memory stand-ins for the upstream services, shared by the tests.

use crate::auth::{AuthContext, Claims};
use crate::job::JobScope;
use crate::products::Product;
use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value as JsonValue, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use upstream::envelope::{CatalogEnvelope, CoreEnvelope, Meta, ScoringEnvelope};
use upstream::types::{
    CreateJobRequest, Grade, Job, JobDetail, JobDetailFilter, JobListFilter, JobRef,
    JobSummaryFilter, MemberScope, ProductInfo, QuotaQuery, SubscribedProduct, TransactionLog,
    TransactionUpdate, UpdateJobRequest,
};
use upstream::{
    CallContext, CoreApi, ExternalApiError, ProductApi, ProductResponse, ProductRoute,
    UpstreamError,
};

pub const SESSION_SECRET: &str = "test-secret";

pub fn claims(quota_type: &str) -> Claims {
    Claims {
        company_id: 9,
        member_id: 5,
        role_id: 2,
        tier_level: 2,
        quota_type: quota_type.to_string(),
        api_key: "key-1".to_string(),
        exp: 4_102_444_800,
    }
}

pub fn session_token(claims: &Claims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn auth_context(quota_type: &str) -> AuthContext {
    claims(quota_type).into()
}

pub fn job_scope(product: Product, job_id: u64) -> JobScope {
    JobScope {
        product,
        job_id,
        total: 1,
        member_id: 5,
        company_id: 9,
        product_id: 4,
        product_group_id: 2,
        api_key: "key-1".to_string(),
    }
}

pub fn catalog_success(transaction_id: &str) -> ProductResponse {
    ProductResponse::Catalog(CatalogEnvelope {
        success: true,
        data: Some(json!({"status": "VALID"})),
        input: json!({}),
        message: "succeed".to_string(),
        pricing_strategy: "PAY".to_string(),
        transaction_id: transaction_id.to_string(),
        datetime: "2024-01-01 00:00:00".to_string(),
        status_code: 200,
    })
}

pub fn scoring_success() -> ProductResponse {
    ProductResponse::Scoring(ScoringEnvelope {
        success: true,
        data: Some(json!({"probability_to_default": 0.12, "grade": "A"})),
        message: "ok".to_string(),
        error_message: None,
        status_code: 200,
    })
}

fn not_found(message: &str) -> UpstreamError {
    ExternalApiError::new(404, message).into()
}

fn core_envelope<T>(data: T, meta: Option<Meta>) -> CoreEnvelope<T> {
    CoreEnvelope {
        success: true,
        data: Some(data),
        message: "ok".to_string(),
        meta,
        status_code: 200,
    }
}

/// Recorded state of [`StubCore`].
#[derive(Default)]
struct CoreState {
    subscription_missing: bool,
    quota: i64,
    grades: Vec<Grade>,
    processed_count: Option<u64>,
    fail_processed_count: bool,
    fail_transaction_writes: bool,
    next_job_id: u64,
    created_jobs: Vec<CreateJobRequest>,
    job_updates: Vec<(u64, UpdateJobRequest)>,
    transactions: Vec<TransactionLog>,
    transaction_updates: Vec<String>,
    jobs: Vec<Job>,
    details: Vec<JobDetail>,
    detail_filters: Vec<JobDetailFilter>,
    summary_filters: Vec<JobSummaryFilter>,
}

/// A core service kept in memory.
///
/// Unless overridden, the processed count of a job is the number of
/// successful log entries written for it plus the number of upstream entries
/// marked successful.
#[derive(Default)]
pub struct StubCore {
    state: Mutex<CoreState>,
}

impl StubCore {
    pub fn without_subscription(self) -> Self {
        self.state.lock().unwrap().subscription_missing = true;
        self
    }

    pub fn set_quota(&self, quota: i64) {
        self.state.lock().unwrap().quota = quota;
    }

    pub fn set_grades(&self, grades: Vec<Grade>) {
        self.state.lock().unwrap().grades = grades;
    }

    pub fn set_processed_count(&self, count: u64) {
        self.state.lock().unwrap().processed_count = Some(count);
    }

    pub fn fail_processed_count(&self, fail: bool) {
        self.state.lock().unwrap().fail_processed_count = fail;
    }

    pub fn fail_transaction_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_transaction_writes = fail;
    }

    pub fn set_jobs(&self, jobs: Vec<Job>) {
        self.state.lock().unwrap().jobs = jobs;
    }

    pub fn set_details(&self, details: Vec<JobDetail>) {
        self.state.lock().unwrap().details = details;
    }

    pub fn created_jobs(&self) -> Vec<CreateJobRequest> {
        self.state.lock().unwrap().created_jobs.clone()
    }

    pub fn job_updates(&self, job_id: u64) -> Vec<UpdateJobRequest> {
        self.state
            .lock()
            .unwrap()
            .job_updates
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    pub fn transactions(&self) -> Vec<TransactionLog> {
        self.state.lock().unwrap().transactions.clone()
    }

    pub fn transaction_updates(&self) -> Vec<String> {
        self.state.lock().unwrap().transaction_updates.clone()
    }

    pub fn detail_filters(&self) -> Vec<JobDetailFilter> {
        self.state.lock().unwrap().detail_filters.clone()
    }

    pub fn summary_filters(&self) -> Vec<JobSummaryFilter> {
        self.state.lock().unwrap().summary_filters.clone()
    }
}

#[async_trait]
impl CoreApi for StubCore {
    async fn subscribed_product(
        &self,
        _company_id: u64,
        slug: &str,
    ) -> Result<SubscribedProduct, UpstreamError> {
        if self.state.lock().unwrap().subscription_missing {
            return Err(not_found("subscribed product not found"));
        }
        Ok(SubscribedProduct {
            subscribed_product_id: 31,
            product_id: 4,
            product: ProductInfo {
                product_group_id: 2,
                slug: slug.to_string(),
                name: slug.to_string(),
            },
        })
    }

    async fn remaining_quota(&self, _query: &QuotaQuery) -> Result<i64, UpstreamError> {
        Ok(self.state.lock().unwrap().quota)
    }

    async fn grades(&self, _company_id: u64) -> Result<Vec<Grade>, UpstreamError> {
        Ok(self.state.lock().unwrap().grades.clone())
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobRef, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.next_job_id += 1;
        state.created_jobs.push(request.clone());
        Ok(JobRef {
            id: state.next_job_id,
            member_id: request.member_id,
            company_id: request.company_id,
        })
    }

    async fn update_job(
        &self,
        job_id: u64,
        request: &UpdateJobRequest,
    ) -> Result<(), UpstreamError> {
        self.state
            .lock()
            .unwrap()
            .job_updates
            .push((job_id, request.clone()));
        Ok(())
    }

    async fn processed_count(&self, job_id: u64) -> Result<u64, UpstreamError> {
        let state = self.state.lock().unwrap();
        if state.fail_processed_count {
            return Err(UpstreamError::Timeout("core"));
        }
        if let Some(count) = state.processed_count {
            return Ok(count);
        }
        let logged = state
            .transactions
            .iter()
            .filter(|log| log.job_id == job_id && log.success)
            .count();
        Ok((logged + state.transaction_updates.len()) as u64)
    }

    async fn create_transaction(&self, log: &TransactionLog) -> Result<(), UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_transaction_writes {
            return Err(ExternalApiError::new(500, "log store unavailable").into());
        }
        state.transactions.push(log.clone());
        Ok(())
    }

    async fn update_transaction(
        &self,
        transaction_id: &str,
        update: &TransactionUpdate,
    ) -> Result<(), UpstreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_transaction_writes {
            return Err(ExternalApiError::new(500, "log store unavailable").into());
        }
        if update.success {
            state.transaction_updates.push(transaction_id.to_string());
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        _scope: &MemberScope,
        _slug: &str,
        filter: &JobListFilter,
    ) -> Result<CoreEnvelope<Vec<Job>>, UpstreamError> {
        let jobs = self.state.lock().unwrap().jobs.clone();
        let meta = Meta {
            page: filter.page.unwrap_or(1),
            size: filter.size.unwrap_or(10),
            total_pages: 1,
            total_data: jobs.len() as i64,
        };
        Ok(core_envelope(jobs, Some(meta)))
    }

    async fn job_details(
        &self,
        _scope: &MemberScope,
        _slug: &str,
        job_id: u64,
        filter: &JobDetailFilter,
    ) -> Result<CoreEnvelope<Vec<JobDetail>>, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.detail_filters.push(filter.clone());
        let details: Vec<JobDetail> = state
            .details
            .iter()
            .filter(|d| d.job_id == job_id)
            .cloned()
            .collect();
        if details.is_empty() {
            return Err(not_found("job not found"));
        }
        let meta = Meta {
            page: 1,
            size: filter.size.unwrap_or(10),
            total_pages: 1,
            total_data: details.len() as i64,
        };
        Ok(core_envelope(details, Some(meta)))
    }

    async fn jobs_summary(
        &self,
        _scope: &MemberScope,
        _slug: &str,
        filter: &JobSummaryFilter,
    ) -> Result<CoreEnvelope<Vec<JobDetail>>, UpstreamError> {
        let mut state = self.state.lock().unwrap();
        state.summary_filters.push(filter.clone());
        Ok(core_envelope(state.details.clone(), None))
    }
}

type Responder =
    Box<dyn Fn(ProductRoute, &JsonValue) -> Result<ProductResponse, UpstreamError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ProductCall {
    pub path: &'static str,
    pub ctx: CallContext,
    pub body: JsonValue,
    pub at: Instant,
}

/// Product services kept in memory. By default every call succeeds, with a
/// fresh upstream transaction id for catalog products.
#[derive(Default)]
pub struct StubProducts {
    responder: Mutex<Option<Responder>>,
    calls: Mutex<Vec<ProductCall>>,
    next_transaction: AtomicU64,
}

impl StubProducts {
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(ProductRoute, &JsonValue) -> Result<ProductResponse, UpstreamError>
            + Send
            + Sync
            + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    pub fn calls(&self) -> Vec<ProductCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProductApi for StubProducts {
    async fn call(
        &self,
        route: ProductRoute,
        ctx: &CallContext,
        body: &JsonValue,
    ) -> Result<ProductResponse, UpstreamError> {
        self.calls.lock().unwrap().push(ProductCall {
            path: route.path(),
            ctx: ctx.clone(),
            body: body.clone(),
            at: Instant::now(),
        });

        if let Some(responder) = self.responder.lock().unwrap().as_ref() {
            return responder(route, body);
        }

        match route {
            ProductRoute::Catalog(_) => {
                let n = self.next_transaction.fetch_add(1, Ordering::Relaxed) + 1;
                Ok(catalog_success(&format!("TRX-{n}")))
            }
            ProductRoute::Scoring(_) => Ok(scoring_success()),
        }
    }
}
