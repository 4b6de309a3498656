//! Metrics definitions for upstream clients.

use shared::metrics_defs::{MetricDef, MetricType};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Upstream request duration in seconds. Tagged with upstream, status.",
};

pub const ALL_METRICS: &[MetricDef] = &[UPSTREAM_REQUEST_DURATION];
