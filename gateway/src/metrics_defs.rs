//! Metrics definitions for the gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const BULK_JOBS_CREATED: MetricDef = MetricDef {
    name: "bulk.jobs.created",
    metric_type: MetricType::Counter,
    description: "Jobs created by bulk uploads. Tagged with product.",
};

pub const BULK_ROWS_DISPATCHED: MetricDef = MetricDef {
    name: "bulk.rows.dispatched",
    metric_type: MetricType::Counter,
    description: "Rows sent to a product by the bulk dispatcher.",
};

pub const BULK_ROWS_FAILED: MetricDef = MetricDef {
    name: "bulk.rows.failed",
    metric_type: MetricType::Counter,
    description: "Rows that did not succeed. Tagged with reason: validation, upstream.",
};

pub const JOBS_FINALIZED: MetricDef = MetricDef {
    name: "jobs.finalized",
    metric_type: MetricType::Counter,
    description: "Jobs moved to a terminal status. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    BULK_JOBS_CREATED,
    BULK_ROWS_DISPATCHED,
    BULK_ROWS_FAILED,
    JOBS_FINALIZED,
];
