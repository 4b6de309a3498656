//! Lifecycle of one job.
//!
//! The core service owns the job record; the gateway only drives its status.
//! A job goes `pending -> in_progress -> done | failed`. `error` is reserved
//! for the core service and never written here.
//!
//! The first failed product call latches the job as failed and writes that
//! status immediately. The terminal record is written once, after every row
//! has finished, together with the processed count read back from the core
//! service.

use crate::metrics_defs::JOBS_FINALIZED;
use crate::products::Product;
use chrono::{DateTime, Utc};
use shared::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use upstream::types::{JobStatus, UpdateJobRequest};
use upstream::{CallContext, CoreApi, UpstreamError};

/// Everything a row needs to know about the job it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScope {
    pub product: Product,
    pub job_id: u64,
    pub total: u64,
    pub member_id: u64,
    pub company_id: u64,
    pub product_id: u64,
    pub product_group_id: u64,
    pub api_key: String,
}

impl JobScope {
    pub fn call_context(&self) -> CallContext {
        CallContext {
            api_key: self.api_key.clone(),
            job_id: self.job_id,
            member_id: self.member_id,
            company_id: self.company_id,
        }
    }
}

/// Terminal state of a job as written to the core service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedJob {
    pub job_id: u64,
    pub total: u64,
    pub status: JobStatus,
    pub success_count: u64,
    pub end_at: DateTime<Utc>,
}

pub struct JobTracker {
    core: Arc<dyn CoreApi>,
    job_id: u64,
    total: u64,
    failed: AtomicBool,
    terminal: OnceCell<FinalizedJob>,
}

impl JobTracker {
    pub fn new(core: Arc<dyn CoreApi>, job_id: u64, total: u64) -> Self {
        JobTracker {
            core,
            job_id,
            total,
            failed: AtomicBool::new(false),
            terminal: OnceCell::new(),
        }
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Moves the job to `in_progress`.
    pub async fn start(&self) -> Result<(), UpstreamError> {
        self.core
            .update_job(
                self.job_id,
                &UpdateJobRequest {
                    success_count: None,
                    status: JobStatus::InProgress,
                    end_at: None,
                },
            )
            .await
    }

    /// Latches the job as failed. Returns true only for the first caller.
    pub fn mark_failed(&self) -> bool {
        let first = !self.failed.swap(true, Ordering::AcqRel);
        if first {
            tracing::warn!(job_id = self.job_id, "job marked as failed");
        }
        first
    }

    /// Latches the job as failed and, the first time, writes `failed` to the
    /// core service right away. The write is best effort; finalize writes the
    /// terminal record with the success count regardless.
    pub async fn fail(&self) {
        if !self.mark_failed() {
            return;
        }
        let update = UpdateJobRequest {
            success_count: None,
            status: JobStatus::Failed,
            end_at: None,
        };
        if let Err(e) = self.core.update_job(self.job_id, &update).await {
            tracing::warn!(job_id = self.job_id, error = %e, "could not mark job as failed");
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Writes the terminal state. Only the first successful call reaches the
    /// core service; later calls return the same record.
    pub async fn finalize(&self) -> Result<FinalizedJob, UpstreamError> {
        self.terminal
            .get_or_try_init(|| self.write_terminal())
            .await
            .cloned()
    }

    async fn write_terminal(&self) -> Result<FinalizedJob, UpstreamError> {
        let processed = self.core.processed_count(self.job_id).await?;
        if processed > self.total {
            tracing::warn!(
                job_id = self.job_id,
                processed,
                total = self.total,
                "processed count exceeds job total"
            );
        }
        let success_count = processed.min(self.total);

        let status = if self.is_failed() {
            JobStatus::Failed
        } else {
            JobStatus::Done
        };
        let end_at = Utc::now();

        self.core
            .update_job(
                self.job_id,
                &UpdateJobRequest {
                    success_count: Some(success_count),
                    status,
                    end_at: Some(end_at),
                },
            )
            .await?;

        counter!(JOBS_FINALIZED, "status" => status.as_str()).increment(1);
        tracing::info!(
            job_id = self.job_id,
            status = status.as_str(),
            success_count,
            total = self.total,
            "job finalized"
        );

        Ok(FinalizedJob {
            job_id: self.job_id,
            total: self.total,
            status,
            success_count,
            end_at,
        })
    }
}
