//! Client for product data calls.
//!
//! Most products live on the product-catalog host and answer with a
//! [`CatalogEnvelope`]; gen-retail scoring lives on its own host and answers
//! with a [`ScoringEnvelope`]. Both are reached through [`ProductApi::call`].

use crate::envelope::{CatalogEnvelope, ScoringEnvelope, send_envelope};
use crate::error::UpstreamError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

const HEADER_API_KEY: &str = "X-API-KEY";
const HEADER_MEMBER_ID: &str = "X-Member-ID";
const HEADER_COMPANY_ID: &str = "X-Company-ID";

/// Where a product lives and which path it answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductRoute {
    Catalog(&'static str),
    Scoring(&'static str),
}

impl ProductRoute {
    pub fn path(&self) -> &'static str {
        match self {
            ProductRoute::Catalog(path) | ProductRoute::Scoring(path) => path,
        }
    }

    pub fn upstream_name(&self) -> &'static str {
        match self {
            ProductRoute::Catalog(_) => "product_catalog",
            ProductRoute::Scoring(_) => "scoring",
        }
    }
}

/// Caller identity attached to every product data call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub api_key: String,
    pub job_id: u64,
    pub member_id: u64,
    pub company_id: u64,
}

#[derive(Serialize)]
struct JobQuery {
    job_id: u64,
}

#[derive(Debug, Clone)]
pub enum ProductResponse {
    Catalog(CatalogEnvelope<JsonValue>),
    Scoring(ScoringEnvelope<JsonValue>),
}

impl ProductResponse {
    pub fn data(&self) -> Option<&JsonValue> {
        match self {
            ProductResponse::Catalog(e) => e.data.as_ref(),
            ProductResponse::Scoring(e) => e.data.as_ref(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProductResponse::Catalog(e) => &e.message,
            ProductResponse::Scoring(e) => &e.message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ProductResponse::Catalog(e) => e.status_code,
            ProductResponse::Scoring(e) => e.status_code,
        }
    }

    /// Transaction id assigned upstream. Only the product catalog writes
    /// transaction logs, so scoring responses never carry one.
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            ProductResponse::Catalog(e) if !e.transaction_id.is_empty() => {
                Some(&e.transaction_id)
            }
            _ => None,
        }
    }

    /// The envelope as JSON, for transaction logs.
    pub fn to_json(&self) -> JsonValue {
        let value = match self {
            ProductResponse::Catalog(e) => serde_json::to_value(e),
            ProductResponse::Scoring(e) => serde_json::to_value(e),
        };
        value.unwrap_or(JsonValue::Null)
    }
}

#[async_trait]
pub trait ProductApi: Send + Sync {
    /// Calls a product with `body` on behalf of `ctx`.
    async fn call(
        &self,
        route: ProductRoute,
        ctx: &CallContext,
        body: &JsonValue,
    ) -> Result<ProductResponse, UpstreamError>;
}

#[derive(Clone)]
pub struct ProductClient {
    client: reqwest::Client,
    catalog_url: Url,
    scoring_url: Url,
    timeout: Duration,
}

impl ProductClient {
    pub fn new(
        client: reqwest::Client,
        catalog_url: Url,
        scoring_url: Url,
        timeout: Duration,
    ) -> Self {
        ProductClient {
            client,
            catalog_url,
            scoring_url,
            timeout,
        }
    }

    fn url(&self, route: ProductRoute) -> Result<Url, UpstreamError> {
        let base = match route {
            ProductRoute::Catalog(_) => &self.catalog_url,
            ProductRoute::Scoring(_) => &self.scoring_url,
        };
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(route.path().split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl ProductApi for ProductClient {
    async fn call(
        &self,
        route: ProductRoute,
        ctx: &CallContext,
        body: &JsonValue,
    ) -> Result<ProductResponse, UpstreamError> {
        let url = self.url(route)?;
        let request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(HEADER_API_KEY, ctx.api_key.as_str())
            .header(HEADER_MEMBER_ID, ctx.member_id)
            .header(HEADER_COMPANY_ID, ctx.company_id)
            .query(&JobQuery { job_id: ctx.job_id })
            .json(body);

        let upstream = route.upstream_name();
        match route {
            ProductRoute::Catalog(_) => send_envelope(upstream, request)
                .await
                .map(ProductResponse::Catalog),
            ProductRoute::Scoring(_) => send_envelope(upstream, request)
                .await
                .map(ProductResponse::Scoring),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> CallContext {
        CallContext {
            api_key: "key-1".to_string(),
            job_id: 77,
            member_id: 5,
            company_id: 9,
        }
    }

    fn client_for(catalog: &MockServer, scoring: &MockServer, timeout: Duration) -> ProductClient {
        ProductClient::new(
            reqwest::Client::new(),
            Url::parse(&catalog.uri()).unwrap(),
            Url::parse(&scoring.uri()).unwrap(),
            timeout,
        )
    }

    #[tokio::test]
    async fn catalog_call_sends_identity_and_job() {
        let catalog = MockServer::start().await;
        let scoring = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/identity/phone-live-status"))
            .and(header("X-API-KEY", "key-1"))
            .and(header("X-Member-ID", "5"))
            .and(header("X-Company-ID", "9"))
            .and(query_param("job_id", "77"))
            .and(body_json(json!({"phone_number": "081234567890"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"live_status": "active, reachable"},
                "input": {"phone_number": "081234567890"},
                "message": "succeed",
                "pricing_strategy": "PAY",
                "transaction_id": "TRX-9",
                "datetime": "2024-01-01 00:00:00"
            })))
            .expect(1)
            .mount(&catalog)
            .await;

        let response = client_for(&catalog, &scoring, Duration::from_secs(5))
            .call(
                ProductRoute::Catalog("/product/identity/phone-live-status"),
                &ctx(),
                &json!({"phone_number": "081234567890"}),
            )
            .await
            .unwrap();
        assert_eq!(response.transaction_id(), Some("TRX-9"));
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.data().unwrap()["live_status"], "active, reachable");
        assert_eq!(response.to_json()["pricing_strategy"], "PAY");
    }

    #[tokio::test]
    async fn scoring_call_goes_to_scoring_host() {
        let catalog = MockServer::start().await;
        let scoring = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/score/genretail/v3"))
            .and(query_param("job_id", "77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"probability_to_default": 0.12, "grade": "A"},
                "message": "ok"
            })))
            .expect(1)
            .mount(&scoring)
            .await;

        let response = client_for(&catalog, &scoring, Duration::from_secs(5))
            .call(
                ProductRoute::Scoring("/api/score/genretail/v3"),
                &ctx(),
                &json!({"loan_no": "L1"}),
            )
            .await
            .unwrap();
        assert!(matches!(response, ProductResponse::Scoring(_)));
        assert_eq!(response.transaction_id(), None);
        assert_eq!(response.data().unwrap()["grade"], "A");
    }

    #[tokio::test]
    async fn partner_unavailable_is_512() {
        let catalog = MockServer::start().await;
        let scoring = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/incometax/tax-score"))
            .respond_with(ResponseTemplate::new(512))
            .mount(&catalog)
            .await;

        let err = client_for(&catalog, &scoring, Duration::from_secs(5))
            .call(
                ProductRoute::Catalog("/product/incometax/tax-score"),
                &ctx(),
                &json!({"npwp": "012345678901234"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.upstream_status(), Some(512));
    }

    #[tokio::test]
    async fn slow_product_times_out() {
        let catalog = MockServer::start().await;
        let scoring = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/product/incometax/tax-score"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&catalog)
            .await;

        let err = client_for(&catalog, &scoring, Duration::from_millis(50))
            .call(
                ProductRoute::Catalog("/product/incometax/tax-score"),
                &ctx(),
                &json!({"npwp": "012345678901234"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout("product_catalog")));
    }
}
