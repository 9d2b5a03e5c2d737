//! In-process metrics registry.
//!
//! Instruments live in a shared `MetricsRegistry` and are rendered by the
//! `/metrics` handler in Prometheus text format.

pub mod metrics;

pub use metrics::{
    Counter, Gauge, Histogram, HistogramOpts, Metric, MetricsError, MetricsRegistry, MetricsResult, Summary,
    SummaryOpts,
};
