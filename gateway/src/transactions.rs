//! Transaction ids and the transaction log entries written by the gateway.
//!
//! The product catalog writes its own log entry for every call it answers;
//! the gateway writes one when a row never reaches a product, when the call
//! fails, and for products whose upstream does not log.

use crate::job::JobScope;
use crate::products::ProductRequest;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use upstream::types::TransactionLog;
use upstream::{ProductResponse, UpstreamError};

/// Status written for rows rejected before dispatch.
pub const VALIDATION_FAILURE_STATUS: u16 = 400;
/// Status written for rows whose product call failed.
pub const UPSTREAM_FAILURE_STATUS: u16 = 502;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns `{prefix}-{yyyyMMddHHmmss}-{seq}`. `seq` increases for the life of
/// the process, so ids never repeat even within the same second.
pub fn next_transaction_id(prefix: &str) -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{prefix}-{}-{seq}", Utc::now().format("%Y%m%d%H%M%S"))
}

fn base_log(
    scope: &JobScope,
    request: &ProductRequest,
    request_time: DateTime<Utc>,
) -> TransactionLog {
    TransactionLog {
        transaction_id: next_transaction_id(scope.product.transaction_prefix()),
        job_id: scope.job_id,
        member_id: scope.member_id,
        company_id: scope.company_id,
        product_id: scope.product_id,
        product_group_id: scope.product_group_id,
        status: 0,
        success: false,
        message: String::new(),
        input: request.to_json(),
        output: None,
        data: None,
        request_time,
        response_time: Utc::now(),
    }
}

pub fn validation_failure(scope: &JobScope, request: &ProductRequest, message: &str) -> TransactionLog {
    let now = Utc::now();
    TransactionLog {
        status: VALIDATION_FAILURE_STATUS,
        message: message.to_string(),
        ..base_log(scope, request, now)
    }
}

pub fn upstream_failure(
    scope: &JobScope,
    request: &ProductRequest,
    error: &UpstreamError,
    request_time: DateTime<Utc>,
) -> TransactionLog {
    let (message, output) = match error {
        UpstreamError::External(e) => (e.message.clone(), e.body.clone()),
        other => (other.to_string(), None),
    };
    let data = output.as_ref().and_then(|body| body.get("data")).cloned();

    TransactionLog {
        status: UPSTREAM_FAILURE_STATUS,
        message,
        output,
        data,
        ..base_log(scope, request, request_time)
    }
}

/// Success entry for products whose upstream keeps no log of its own.
pub fn own_success(
    scope: &JobScope,
    request: &ProductRequest,
    response: &ProductResponse,
    request_time: DateTime<Utc>,
) -> TransactionLog {
    TransactionLog {
        status: response.status_code(),
        success: true,
        message: response.message().to_string(),
        output: Some(response.to_json()),
        data: response.data().cloned(),
        ..base_log(scope, request, request_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::Product;
    use crate::testutils::job_scope;
    use serde_json::json;
    use std::collections::HashSet;
    use upstream::{ExternalApiError, ScoringEnvelope};

    #[test]
    fn ids_are_prefixed_and_distinct() {
        let ids: HashSet<String> = (0..1000).map(|_| next_transaction_id("PLS")).collect();
        assert_eq!(ids.len(), 1000);

        let id = next_transaction_id("ML30");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ML30");
        assert_eq!(parts[1].len(), 14);
        assert!(parts[1].bytes().all(|b| b.is_ascii_digit()));
        assert!(parts[2].parse::<u64>().is_ok());
    }

    #[test]
    fn validation_failure_entry() {
        let scope = job_scope(Product::LoanRecordChecker, 77);
        let request = Product::LoanRecordChecker.request_from_row(&[
            "bad".to_string(),
            "abc".to_string(),
            "123".to_string(),
        ]);
        let log = validation_failure(&scope, &request, "nik must be 16 digits");
        assert!(log.transaction_id.starts_with("LRC-"));
        assert_eq!(log.job_id, 77);
        assert_eq!(log.status, 400);
        assert!(!log.success);
        assert_eq!(log.message, "nik must be 16 digits");
        assert_eq!(log.input["nik"], "abc");
    }

    #[test]
    fn upstream_failure_keeps_catalog_body() {
        let scope = job_scope(Product::TaxScore, 77);
        let request = Product::TaxScore.request_from_row(&["012345678901234".to_string()]);
        let error = UpstreamError::External(ExternalApiError {
            status: 422,
            message: "invalid npwp".to_string(),
            body: Some(json!({"success": false, "data": {"status": "INVALID"}})),
        });
        let log = upstream_failure(&scope, &request, &error, Utc::now());
        assert_eq!(log.status, 502);
        assert_eq!(log.message, "invalid npwp");
        assert_eq!(log.data, Some(json!({"status": "INVALID"})));
        assert!(log.transaction_id.starts_with("TSC-"));
    }

    #[test]
    fn own_success_entry() {
        let scope = job_scope(Product::GenRetailV3, 3);
        let request = Product::GenRetailV3.request_from_row(&[
            "L1".to_string(),
            "Budi".to_string(),
            "1234567890123456".to_string(),
            "081234567890".to_string(),
        ]);
        let response = ProductResponse::Scoring(ScoringEnvelope {
            success: true,
            data: Some(json!({"grade": "A"})),
            message: "ok".to_string(),
            error_message: None,
            status_code: 200,
        });
        let log = own_success(&scope, &request, &response, Utc::now());
        assert!(log.success);
        assert_eq!(log.status, 200);
        assert_eq!(log.data, Some(json!({"grade": "A"})));
        assert!(log.transaction_id.starts_with("GRV3-"));
    }
}
