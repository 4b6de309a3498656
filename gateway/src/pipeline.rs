use crate::job::{JobScope, JobTracker};
use crate::products::ProductRequest;
use crate::transactions;
use chrono::Utc;
use std::sync::Arc;
use upstream::types::{TransactionLog, TransactionUpdate};
use upstream::{CoreApi, ProductApi, ProductResponse, UpstreamError};

#[derive(Debug)]
pub enum RowOutcome {
    /// Rejected before dispatch; a failure entry was logged.
    Invalid {
        transaction_id: String,
        message: String,
    },
    /// The product answered and the success was recorded.
    Succeeded {
        transaction_id: String,
        response: ProductResponse,
    },
    /// The product call failed; the job is latched as failed.
    Failed {
        transaction_id: String,
        error: UpstreamError,
    },
}

#[derive(Debug)]
pub struct RowResult {
    pub outcome: RowOutcome,
    /// Set when the transaction log entry for the row could not be written.
    pub log_error: Option<UpstreamError>,
}

/// Runs one row of a job: validate, call the product, record the outcome.
///
/// Every row that enters `process` leaves exactly one transaction log entry
/// behind, unless writing it fails, which is reported in `log_error`.
#[derive(Clone)]
pub struct RowPipeline {
    core: Arc<dyn CoreApi>,
    products: Arc<dyn ProductApi>,
    scope: Arc<JobScope>,
    tracker: Arc<JobTracker>,
}

impl RowPipeline {
    pub fn new(
        core: Arc<dyn CoreApi>,
        products: Arc<dyn ProductApi>,
        scope: Arc<JobScope>,
        tracker: Arc<JobTracker>,
    ) -> Self {
        RowPipeline {
            core,
            products,
            scope,
            tracker,
        }
    }

    pub async fn process(&self, request: ProductRequest) -> RowResult {
        if let Err(message) = request.validate() {
            let log = transactions::validation_failure(&self.scope, &request, &message);
            tracing::debug!(
                job_id = self.scope.job_id,
                transaction_id = %log.transaction_id,
                %message,
                "row failed validation"
            );
            let log_error = self.core.create_transaction(&log).await.err();
            return RowResult {
                outcome: RowOutcome::Invalid {
                    transaction_id: log.transaction_id,
                    message,
                },
                log_error,
            };
        }

        let product = self.scope.product;
        let request_time = Utc::now();
        let result = self
            .products
            .call(
                product.route(),
                &self.scope.call_context(),
                &request.to_json(),
            )
            .await;

        match result {
            Ok(response) => self.record_success(&request, response, request_time).await,
            Err(error) => {
                self.tracker.fail().await;
                let log = transactions::upstream_failure(&self.scope, &request, &error, request_time);
                tracing::warn!(
                    job_id = self.scope.job_id,
                    transaction_id = %log.transaction_id,
                    product = product.slug(),
                    error = %error,
                    "product call failed"
                );
                let log_error = self.core.create_transaction(&log).await.err();
                RowResult {
                    outcome: RowOutcome::Failed {
                        transaction_id: log.transaction_id,
                        error,
                    },
                    log_error,
                }
            }
        }
    }

    async fn record_success(
        &self,
        request: &ProductRequest,
        response: ProductResponse,
        request_time: chrono::DateTime<Utc>,
    ) -> RowResult {
        let upstream_id = match response.transaction_id() {
            Some(id) if !self.scope.product.logs_own_success() => Some(id.to_string()),
            _ => None,
        };

        let (transaction_id, log_error) = match upstream_id {
            Some(id) => {
                let result = self
                    .core
                    .update_transaction(&id, &TransactionUpdate { success: true })
                    .await;
                (id, result.err())
            }
            None => {
                if !self.scope.product.logs_own_success() {
                    tracing::warn!(
                        job_id = self.scope.job_id,
                        product = self.scope.product.slug(),
                        "product response without transaction id, logging it locally"
                    );
                }
                let log: TransactionLog =
                    transactions::own_success(&self.scope, request, &response, request_time);
                let result = self.core.create_transaction(&log).await;
                (log.transaction_id, result.err())
            }
        };

        RowResult {
            outcome: RowOutcome::Succeeded {
                transaction_id,
                response,
            },
            log_error,
        }
    }
}
