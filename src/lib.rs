//! bigeye crate
//!
//! Library behind the `bigeye` data-quality runner. Metric definitions are loaded from YAML, evaluated
//! against pluggable fetchers, and the resulting values are published as time series to pluggable
//! dashboard backends.
//!
//! # Module Organization
//!
//! - [`config`]: Configuration file loading and validation
//! - [`metrics`]: Metric definitions, definition discovery and evaluation results
//! - [`fetchers`]: Data sources that turn a query into a single number
//! - [`publishers`]: Backends that receive results and own dashboards
//! - [`engine`]: Run context, evaluator, scheduler and dashboard reconciler

/// Result type alias using `ohno::AppError` as the default error type.
pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod config;
pub mod engine;
pub mod fetchers;
pub mod metrics;
pub mod publishers;
