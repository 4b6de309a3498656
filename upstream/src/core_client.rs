use crate::envelope::{CoreEnvelope, send_envelope};
use crate::error::UpstreamError;
use crate::types::{
    CreateJobRequest, Grade, Job, JobDetail, JobDetailFilter, JobListFilter, JobRef,
    JobSummaryFilter, MemberScope, ProcessedCount, Quota, QuotaQuery, SubscribedProduct,
    TransactionLog, TransactionUpdate, UpdateJobRequest,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

const UPSTREAM: &str = "core";

const HEADER_MEMBER_ID: &str = "X-Member-ID";
const HEADER_COMPANY_ID: &str = "X-Company-ID";
const HEADER_TIER_LEVEL: &str = "X-Tier-Level";

/// Operations of the core service the gateway depends on.
///
/// The core service owns jobs, transaction logs, subscriptions and quota.
#[async_trait]
pub trait CoreApi: Send + Sync {
    async fn subscribed_product(
        &self,
        company_id: u64,
        slug: &str,
    ) -> Result<SubscribedProduct, UpstreamError>;

    async fn remaining_quota(&self, query: &QuotaQuery) -> Result<i64, UpstreamError>;

    async fn grades(&self, company_id: u64) -> Result<Vec<Grade>, UpstreamError>;

    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobRef, UpstreamError>;

    async fn update_job(&self, job_id: u64, request: &UpdateJobRequest)
    -> Result<(), UpstreamError>;

    /// Number of transaction logs of `job_id` marked successful.
    async fn processed_count(&self, job_id: u64) -> Result<u64, UpstreamError>;

    async fn create_transaction(&self, log: &TransactionLog) -> Result<(), UpstreamError>;

    async fn update_transaction(
        &self,
        transaction_id: &str,
        update: &TransactionUpdate,
    ) -> Result<(), UpstreamError>;

    async fn list_jobs(
        &self,
        scope: &MemberScope,
        slug: &str,
        filter: &JobListFilter,
    ) -> Result<CoreEnvelope<Vec<Job>>, UpstreamError>;

    async fn job_details(
        &self,
        scope: &MemberScope,
        slug: &str,
        job_id: u64,
        filter: &JobDetailFilter,
    ) -> Result<CoreEnvelope<Vec<JobDetail>>, UpstreamError>;

    async fn jobs_summary(
        &self,
        scope: &MemberScope,
        slug: &str,
        filter: &JobSummaryFilter,
    ) -> Result<CoreEnvelope<Vec<JobDetail>>, UpstreamError>;
}

/// HTTP client for the core service.
///
/// `reqwest::Client` is reference counted, so cloning this is cheap and every
/// clone shares one connection pool.
#[derive(Clone)]
pub struct CoreClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl CoreClient {
    pub fn new(client: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        CoreClient {
            client,
            base_url,
            timeout,
        }
    }

    /// Builds `base_url` + `segments`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
    }

    fn scoped(
        &self,
        method: reqwest::Method,
        url: Url,
        scope: &MemberScope,
    ) -> reqwest::RequestBuilder {
        self.request(method, url)
            .header(HEADER_MEMBER_ID, scope.member_id)
            .header(HEADER_COMPANY_ID, scope.company_id)
            .header(HEADER_TIER_LEVEL, scope.tier_level)
    }
}

#[async_trait]
impl CoreApi for CoreClient {
    async fn subscribed_product(
        &self,
        company_id: u64,
        slug: &str,
    ) -> Result<SubscribedProduct, UpstreamError> {
        let url = self.url(&["api", "core", "member", "subscribed-product", slug])?;
        let request = self
            .request(reqwest::Method::GET, url)
            .header(HEADER_COMPANY_ID, company_id);

        send_envelope::<CoreEnvelope<SubscribedProduct>>(UPSTREAM, request)
            .await?
            .into_data()
    }

    async fn remaining_quota(&self, query: &QuotaQuery) -> Result<i64, UpstreamError> {
        let url = self.url(&["api", "core", "member", "quota"])?;
        let request = self.request(reqwest::Method::GET, url).query(query);

        let quota = send_envelope::<CoreEnvelope<Quota>>(UPSTREAM, request)
            .await?
            .into_data()?;
        Ok(quota.quota)
    }

    async fn grades(&self, company_id: u64) -> Result<Vec<Grade>, UpstreamError> {
        let url = self.url(&["api", "core", "grading"])?;
        let request = self
            .request(reqwest::Method::GET, url)
            .header(HEADER_COMPANY_ID, company_id);

        let envelope = send_envelope::<CoreEnvelope<Vec<Grade>>>(UPSTREAM, request).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn create_job(&self, body: &CreateJobRequest) -> Result<JobRef, UpstreamError> {
        let url = self.url(&["api", "core", "product", "jobs"])?;
        let request = self.request(reqwest::Method::POST, url).json(body);

        send_envelope::<CoreEnvelope<JobRef>>(UPSTREAM, request)
            .await?
            .into_data()
    }

    async fn update_job(&self, job_id: u64, body: &UpdateJobRequest) -> Result<(), UpstreamError> {
        let job_id = job_id.to_string();
        let url = self.url(&["api", "core", "product", "jobs", &job_id])?;
        let request = self.request(reqwest::Method::PUT, url).json(body);

        send_envelope::<CoreEnvelope<JsonValue>>(UPSTREAM, request).await?;
        Ok(())
    }

    async fn processed_count(&self, job_id: u64) -> Result<u64, UpstreamError> {
        let job_id = job_id.to_string();
        let url = self.url(&[
            "api",
            "core",
            "logging",
            "transaction",
            "product-catalog",
            &job_id,
            "processed_count",
        ])?;
        let request = self.request(reqwest::Method::GET, url);

        let count = send_envelope::<CoreEnvelope<ProcessedCount>>(UPSTREAM, request)
            .await?
            .into_data()?;
        Ok(count.processed_count)
    }

    async fn create_transaction(&self, log: &TransactionLog) -> Result<(), UpstreamError> {
        let url = self.url(&["api", "core", "logging", "transaction", "product-catalog"])?;
        let request = self.request(reqwest::Method::POST, url).json(log);

        send_envelope::<CoreEnvelope<JsonValue>>(UPSTREAM, request).await?;
        Ok(())
    }

    async fn update_transaction(
        &self,
        transaction_id: &str,
        update: &TransactionUpdate,
    ) -> Result<(), UpstreamError> {
        let url = self.url(&[
            "api",
            "core",
            "logging",
            "transaction",
            "product-catalog",
            transaction_id,
        ])?;
        let request = self.request(reqwest::Method::PUT, url).json(update);

        send_envelope::<CoreEnvelope<JsonValue>>(UPSTREAM, request).await?;
        Ok(())
    }

    async fn list_jobs(
        &self,
        scope: &MemberScope,
        slug: &str,
        filter: &JobListFilter,
    ) -> Result<CoreEnvelope<Vec<Job>>, UpstreamError> {
        let url = self.url(&["api", "core", "product", slug, "jobs"])?;
        let request = self.scoped(reqwest::Method::GET, url, scope).query(filter);

        send_envelope(UPSTREAM, request).await
    }

    async fn job_details(
        &self,
        scope: &MemberScope,
        slug: &str,
        job_id: u64,
        filter: &JobDetailFilter,
    ) -> Result<CoreEnvelope<Vec<JobDetail>>, UpstreamError> {
        let job_id = job_id.to_string();
        let url = self.url(&["api", "core", "product", slug, "jobs", &job_id])?;
        let request = self.scoped(reqwest::Method::GET, url, scope).query(filter);

        send_envelope(UPSTREAM, request).await
    }

    async fn jobs_summary(
        &self,
        scope: &MemberScope,
        slug: &str,
        filter: &JobSummaryFilter,
    ) -> Result<CoreEnvelope<Vec<JobDetail>>, UpstreamError> {
        let url = self.url(&["api", "core", "product", slug, "jobs-summary"])?;
        let request = self.scoped(reqwest::Method::GET, url, scope).query(filter);

        send_envelope(UPSTREAM, request).await
    }
}
