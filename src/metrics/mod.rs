//! Method-level metrics
//!
//! - [`static_metrics`]: size and complexity measured on one revision's tree
//! - [`process`]: history metrics replayed from commits

pub mod process;
pub mod static_metrics;

pub use process::{
    LineMeasure, LineMetric, MethodProcessMetrics, MetricStat, ProcessMetric, ProcessMetricChain,
    ProcessMetricsMap,
};
pub use static_metrics::StaticMetrics;
