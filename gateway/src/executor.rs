use crate::auth::AuthContext;
use crate::dispatcher::{check_grading, resolve_subscription};
use crate::errors::ApiError;
use crate::job::{JobScope, JobTracker};
use crate::pipeline::{RowOutcome, RowPipeline};
use crate::products::Product;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use upstream::types::CreateJobRequest;
use upstream::{CoreApi, ProductApi, ProductResponse};

/// Runs a single product request as a job of one row.
///
/// Unlike bulk runs the request is validated before the job is created, is
/// not metered, and errors go straight back to the caller.
pub struct SingleExecutor {
    core: Arc<dyn CoreApi>,
    products: Arc<dyn ProductApi>,
}

impl SingleExecutor {
    pub fn new(core: Arc<dyn CoreApi>, products: Arc<dyn ProductApi>) -> Self {
        SingleExecutor { core, products }
    }

    pub async fn execute(
        &self,
        auth: &AuthContext,
        product: Product,
        body: &JsonValue,
    ) -> Result<ProductResponse, ApiError> {
        let subscription = resolve_subscription(self.core.as_ref(), auth, product).await?;

        // Unlike a bulk row, an invalid single request is rejected before any
        // job exists, so it leaves neither a job nor a 400 row log behind.
        let request = product.request_from_json(body);
        request.validate().map_err(ApiError::BadRequest)?;

        if product.requires_grading() {
            check_grading(self.core.as_ref(), auth).await?;
        }

        let job = self
            .core
            .create_job(&CreateJobRequest {
                product_id: subscription.product_id,
                member_id: auth.member_id,
                company_id: auth.company_id,
                total: 1,
            })
            .await?;

        let scope = Arc::new(JobScope {
            product,
            job_id: job.id,
            total: 1,
            member_id: auth.member_id,
            company_id: auth.company_id,
            product_id: subscription.product_id,
            product_group_id: subscription.product.product_group_id,
            api_key: auth.api_key.clone(),
        });
        let tracker = Arc::new(JobTracker::new(self.core.clone(), job.id, 1));
        let pipeline = RowPipeline::new(
            self.core.clone(),
            self.products.clone(),
            scope,
            tracker.clone(),
        );

        if let Err(e) = tracker.start().await {
            tracing::warn!(job_id = job.id, error = %e, "could not mark job as in progress");
        }
        let result = pipeline.process(request).await;
        let finalized = tracker.finalize().await;

        match result.outcome {
            RowOutcome::Failed { error, .. } => {
                if let Err(e) = finalized {
                    tracing::warn!(job_id = job.id, error = %e, "could not finalize job");
                }
                Err(error.into())
            }
            RowOutcome::Invalid { message, .. } => Err(ApiError::BadRequest(message)),
            RowOutcome::Succeeded { response, .. } => {
                if let Some(e) = result.log_error {
                    return Err(e.into());
                }
                finalized?;
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{StubCore, StubProducts, auth_context};
    use serde_json::json;
    use upstream::ExternalApiError;
    use upstream::types::JobStatus;

    fn executor(core: &Arc<StubCore>, products: &Arc<StubProducts>) -> SingleExecutor {
        SingleExecutor::new(core.clone(), products.clone())
    }

    #[tokio::test]
    async fn single_success() {
        let core = Arc::new(StubCore::default());
        let products = Arc::new(StubProducts::default());

        let response = executor(&core, &products)
            .execute(
                &auth_context("1"),
                Product::TaxCompliance,
                &json!({"npwp": "012345678901234"}),
            )
            .await
            .unwrap();
        assert_eq!(response.data().unwrap()["status"], "VALID");

        let created = core.created_jobs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].total, 1);

        let updates = core.job_updates(1);
        assert_eq!(updates.last().unwrap().status, JobStatus::Done);
        assert_eq!(updates.last().unwrap().success_count, Some(1));
    }

    #[tokio::test]
    async fn partner_unavailable_fails_job() {
        let core = Arc::new(StubCore::default());
        let products = Arc::new(StubProducts::default());
        products.respond_with(|_, _| Err(ExternalApiError::new(512, "").into()));

        let err = executor(&core, &products)
            .execute(
                &auth_context("0"),
                Product::TaxScore,
                &json!({"npwp": "012345678901234"}),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status().as_u16(), 512);
        assert_eq!(
            err.message(),
            "The data partner service is currently unavailable."
        );

        let updates = core.job_updates(1);
        let terminal = updates.last().unwrap();
        assert_eq!(terminal.status, JobStatus::Failed);
        assert_eq!(terminal.success_count, Some(0));

        let logs = core.transactions();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, 502);
    }

    #[tokio::test]
    async fn invalid_request_creates_no_job() {
        let core = Arc::new(StubCore::default());
        let products = Arc::new(StubProducts::default());

        let err = executor(&core, &products)
            .execute(
                &auth_context("0"),
                Product::MultipleLoan7Days,
                &json!({"nik": "1234567890123456", "phone_number": "12"}),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ApiError::BadRequest("phone_number is not valid".to_string())
        );
        assert!(core.created_jobs().is_empty());
        assert!(products.calls().is_empty());
    }

    #[tokio::test]
    async fn gen_retail_single_needs_grading() {
        let core = Arc::new(StubCore::default());
        let products = Arc::new(StubProducts::default());

        let err = executor(&core, &products)
            .execute(
                &auth_context("0"),
                Product::GenRetailV3,
                &json!({
                    "loan_no": "L1",
                    "name": "Budi",
                    "nik": "1234567890123456",
                    "phone_number": "081234567890"
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::BadRequest("grading is not configured".to_string())
        );
    }

    #[tokio::test]
    async fn log_failure_surfaces() {
        let core = Arc::new(StubCore::default());
        core.fail_transaction_writes(true);
        let products = Arc::new(StubProducts::default());

        let err = executor(&core, &products)
            .execute(
                &auth_context("0"),
                Product::NpwpVerification,
                &json!({"npwp": "012345678901234"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
    }
}
