//! Clients for the upstream services behind the gateway.
//!
//! The gateway owns no state of its own. Jobs, transaction logs, subscriptions
//! and quota live in the core service; product data comes from the product
//! catalog and scoring services. `CoreApi` and `ProductApi` are the seams the
//! gateway is written against, `CoreClient` and `ProductClient` are their HTTP
//! implementations.

pub mod core_client;
pub mod envelope;
pub mod error;
pub mod metrics_defs;
pub mod product;
pub mod types;

pub use crate::core_client::{CoreApi, CoreClient};
pub use crate::envelope::{CatalogEnvelope, CoreEnvelope, Envelope, Meta, ScoringEnvelope};
pub use crate::error::{ExternalApiError, UpstreamError};
pub use crate::product::{CallContext, ProductApi, ProductClient, ProductResponse, ProductRoute};
