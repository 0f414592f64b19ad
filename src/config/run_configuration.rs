use crate::config::ConfigError;
use crate::metrics::MetricType;
use core::str::FromStr;
use core::time::Duration;
use serde::{Deserialize, Deserializer};
use strum::{Display, IntoEnumIterator};

const fn default_iterations() -> u32 {
    1
}

const fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_workers() -> usize {
    4
}

fn default_types() -> Vec<MetricType> {
    MetricType::iter().collect()
}

/// The `runConfiguration` section: what is enabled for a run and how the run is scheduled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RunConfiguration {
    /// Names of the fetchers enabled for this run
    #[serde(default)]
    pub fetchers: Vec<String>,

    /// Names of the publishers enabled for this run
    #[serde(default)]
    pub publishers: Vec<String>,

    /// Metric types evaluated in this run, all of them when omitted
    #[serde(default = "default_types")]
    pub types: Vec<MetricType>,

    /// Number of pending results that triggers a flush
    pub batch_size: usize,

    /// Cooperative deadline for the whole run, in seconds
    #[serde(deserialize_with = "seconds")]
    pub max_test_duration: Duration,

    /// Pause between two iterations, in seconds
    #[serde(default, deserialize_with = "seconds")]
    pub time_between_calls: Duration,

    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Upper bound for a single fetch, in seconds
    #[serde(default = "default_fetch_timeout", deserialize_with = "seconds")]
    pub fetch_timeout: Duration,

    /// Number of definitions evaluated concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl RunConfiguration {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        const ENTRY: &str = "runConfiguration";

        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value(ENTRY, "batchSize", "must be at least 1"));
        }

        if self.iterations == 0 {
            return Err(ConfigError::invalid_value(ENTRY, "iterations", "must be at least 1"));
        }

        if self.workers == 0 {
            return Err(ConfigError::invalid_value(ENTRY, "workers", "must be at least 1"));
        }

        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::invalid_value(ENTRY, "fetchTimeout", "must be greater than zero"));
        }

        if self.types.is_empty() {
            return Err(ConfigError::invalid_value(ENTRY, "types", "at least one metric type is required"));
        }

        Ok(())
    }
}

fn seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(|e| serde::de::Error::custom(format!("invalid duration {secs}: {e}")))
}

/// How the process behaves once configuration and definitions are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunMode {
    /// Evaluate the metrics and publish the results
    #[strum(serialize = "master")]
    Master,

    /// Bring every publisher's dashboards in line with the loaded definitions
    #[strum(serialize = "updateBoards")]
    UpdateBoards,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Self::Master),
            "updateBoards" => Ok(Self::UpdateBoards),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}
