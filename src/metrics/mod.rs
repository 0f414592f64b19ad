//! Metric definitions and the results produced by evaluating them
//!
//! A metric definition is one YAML test file. It names the metric, declares whether it is a
//! single-source *quality* check or a dual-source *consistency* check, and lists sub-metrics.
//! Each sub-metric binds the fetchers that produce its value and the publishers that receive it.
//!
//! Definitions are discovered with a glob pattern, validated against the loaded
//! [`Config`](crate::config::Config), and are immutable afterwards.

mod loader;
mod metric_def;
mod metric_result;

pub use loader::{discover, load_definitions, load_files};
pub use metric_def::{Action, Binding, MetricDefinition, MetricType, SubMetric};
pub use metric_result::MetricResult;
