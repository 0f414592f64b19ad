//! Configuration file loading and validation
//!
//! The configuration file is a YAML document with three top-level sections:
//!
//! - `Fetchers`: named data sources, each a mapping with a `type` key plus scalar parameters
//! - `Publishers`: named result backends, shaped the same way
//! - `runConfiguration`: which fetchers and publishers are enabled plus the run schedule
//!
//! Everything is validated once at load time. Any problem is reported as a [`ConfigError`] naming
//! the offending entry, and no run starts.

#[expect(clippy::module_inception, reason = "mirrors the type it holds")]
mod config;
mod connector;
mod error;
mod run_configuration;

pub use config::Config;
pub use connector::{FetcherConfig, FetcherKind, Params, PublisherConfig, PublisherKind};
pub use error::ConfigError;
pub use run_configuration::{RunConfiguration, RunMode};

pub(crate) use connector::params_from_mapping;
