//! Bulk dispatch of uploaded CSV files.
//!
//! A bulk run resolves the subscription, parses the upload, checks quota and
//! grading, creates the job and then fans one task out per data row. Tasks
//! are spawned in waves (see [`RateGate`]). The run lives in a detached task
//! and finalizes the job even if the client goes away.

use crate::auth::AuthContext;
use crate::config::BulkConfig;
use crate::csv_reader::{self, CsvError};
use crate::errors::ApiError;
use crate::job::{FinalizedJob, JobScope, JobTracker};
use crate::metrics_defs::{BULK_JOBS_CREATED, BULK_ROWS_DISPATCHED, BULK_ROWS_FAILED};
use crate::pipeline::{RowOutcome, RowPipeline, RowResult};
use crate::products::{Product, ProductRequest};
use crate::rate_gate::RateGate;
use serde::Serialize;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use upstream::types::{CreateJobRequest, JobStatus, QuotaQuery, SubscribedProduct};
use upstream::{CoreApi, ProductApi, UpstreamError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSettings {
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub max_in_flight: Option<usize>,
}

impl From<&BulkConfig> for BulkSettings {
    fn from(config: &BulkConfig) -> Self {
        BulkSettings {
            batch_size: config.batch_size,
            batch_interval: config.batch_interval(),
            max_in_flight: config.max_in_flight,
        }
    }
}

/// Result of a finished bulk run as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub job_id: u64,
    pub total: u64,
    pub success_count: u64,
    pub status: JobStatus,
}

impl From<FinalizedJob> for BulkSummary {
    fn from(job: FinalizedJob) -> Self {
        BulkSummary {
            job_id: job.job_id,
            total: job.total,
            success_count: job.success_count,
            status: job.status,
        }
    }
}

pub struct BulkDispatcher {
    core: Arc<dyn CoreApi>,
    products: Arc<dyn ProductApi>,
    settings: BulkSettings,
}

impl BulkDispatcher {
    pub fn new(
        core: Arc<dyn CoreApi>,
        products: Arc<dyn ProductApi>,
        settings: BulkSettings,
    ) -> Self {
        BulkDispatcher {
            core,
            products,
            settings,
        }
    }

    pub async fn dispatch(
        &self,
        auth: &AuthContext,
        product: Product,
        csv: &[u8],
    ) -> Result<BulkSummary, ApiError> {
        let subscription = resolve_subscription(self.core.as_ref(), auth, product).await?;

        let rows = csv_reader::read_rows(csv, product.csv_header())?;
        let data_rows = &rows[1..];
        if data_rows.is_empty() {
            return Err(CsvError::NoDataRows.into());
        }
        let total = data_rows.len() as u64;

        if auth.is_metered() {
            let remaining = self
                .core
                .remaining_quota(&QuotaQuery {
                    member_id: auth.member_id,
                    company_id: auth.company_id,
                    subscribed_id: subscription.subscribed_product_id,
                    quota_type: auth.quota_type.clone(),
                })
                .await?;
            if remaining < total as i64 {
                tracing::info!(
                    product = product.slug(),
                    company_id = auth.company_id,
                    remaining,
                    requested = total,
                    "bulk upload exceeds quota"
                );
                return Err(ApiError::Forbidden("quota exceeded".to_string()));
            }
        }

        if product.requires_grading() {
            check_grading(self.core.as_ref(), auth).await?;
        }

        let job = self
            .core
            .create_job(&CreateJobRequest {
                product_id: subscription.product_id,
                member_id: auth.member_id,
                company_id: auth.company_id,
                total,
            })
            .await?;
        counter!(BULK_JOBS_CREATED, "product" => product.slug()).increment(1);
        tracing::info!(job_id = job.id, product = product.slug(), total, "bulk job created");

        let scope = Arc::new(JobScope {
            product,
            job_id: job.id,
            total,
            member_id: auth.member_id,
            company_id: auth.company_id,
            product_id: subscription.product_id,
            product_group_id: subscription.product.product_group_id,
            api_key: auth.api_key.clone(),
        });
        let tracker = Arc::new(JobTracker::new(self.core.clone(), job.id, total));
        let pipeline = RowPipeline::new(
            self.core.clone(),
            self.products.clone(),
            scope,
            tracker.clone(),
        );
        let requests: Vec<ProductRequest> = data_rows
            .iter()
            .map(|row| product.request_from_row(row))
            .collect();

        let run = tokio::spawn(run_job(
            pipeline,
            tracker,
            requests,
            self.settings.clone(),
        ));

        match run.await {
            Ok(result) => Ok(result?.into()),
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "bulk run panicked");
                Err(ApiError::Internal("bulk run did not complete".to_string()))
            }
        }
    }
}

/// Fans the rows out and finalizes the job once every row has finished.
async fn run_job(
    pipeline: RowPipeline,
    tracker: Arc<JobTracker>,
    requests: Vec<ProductRequest>,
    settings: BulkSettings,
) -> Result<FinalizedJob, UpstreamError> {
    let job_id = tracker.job_id();
    if let Err(e) = tracker.start().await {
        tracing::warn!(job_id, error = %e, "could not mark job as in progress");
    }

    let mut gate = RateGate::new(settings.batch_size, settings.batch_interval);
    let in_flight = settings.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
    let mut join_set = JoinSet::new();

    for request in requests {
        gate.admit().await;
        let permit = match &in_flight {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };

        let pipeline = pipeline.clone();
        counter!(BULK_ROWS_DISPATCHED).increment(1);
        join_set.spawn(async move {
            let result = pipeline.process(request).await;
            drop(permit);
            result
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => record_row(job_id, result),
            Err(e) => tracing::error!(job_id, error = %e, "row task panicked"),
        }
    }

    tracker.finalize().await
}

fn record_row(job_id: u64, result: RowResult) {
    match &result.outcome {
        RowOutcome::Invalid { .. } => {
            counter!(BULK_ROWS_FAILED, "reason" => "validation").increment(1);
        }
        RowOutcome::Failed { .. } => {
            counter!(BULK_ROWS_FAILED, "reason" => "upstream").increment(1);
        }
        RowOutcome::Succeeded { .. } => {}
    }

    if let Some(e) = result.log_error {
        let transaction_id = match &result.outcome {
            RowOutcome::Invalid { transaction_id, .. }
            | RowOutcome::Succeeded { transaction_id, .. }
            | RowOutcome::Failed { transaction_id, .. } => transaction_id.as_str(),
        };
        tracing::warn!(job_id, transaction_id, error = %e, "could not write transaction log");
    }
}

/// Looks up the tenant's subscription to `product`.
pub(crate) async fn resolve_subscription(
    core: &dyn CoreApi,
    auth: &AuthContext,
    product: Product,
) -> Result<SubscribedProduct, ApiError> {
    match core.subscribed_product(auth.company_id, product.slug()).await {
        Ok(subscription) => Ok(subscription),
        Err(e) if e.upstream_status() == Some(404) => {
            Err(ApiError::NotFound("subscription not found".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Scoring products need at least one configured grade.
pub(crate) async fn check_grading(core: &dyn CoreApi, auth: &AuthContext) -> Result<(), ApiError> {
    let grades = core.grades(auth.company_id).await?;
    if grades.is_empty() {
        return Err(ApiError::BadRequest("grading is not configured".to_string()));
    }
    Ok(())
}
