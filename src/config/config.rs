use crate::config::{ConfigError, FetcherConfig, PublisherConfig, RunConfiguration};
use camino::Utf8Path;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fs;

const LOG_TARGET: &str = "    config";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(rename = "Fetchers", default)]
    fetchers: Mapping,

    #[serde(rename = "Publishers", default)]
    publishers: Mapping,

    #[serde(rename = "runConfiguration")]
    run_configuration: RunConfiguration,
}

/// The validated content of a configuration file.
///
/// Fetchers and publishers keep their declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub fetchers: Vec<FetcherConfig>,
    pub publishers: Vec<PublisherConfig>,
    pub run: RunConfiguration,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        log::debug!(target: LOG_TARGET, "Loading configuration from '{path}'");

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&text, path)
    }

    /// Parses and validates configuration text; `origin` is only used in error messages.
    pub fn from_yaml(text: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;

        let fetchers = parse_entries(&raw.fetchers, "Fetchers", FetcherConfig::from_yaml)?;
        let publishers = parse_entries(&raw.publishers, "Publishers", PublisherConfig::from_yaml)?;

        let config = Self {
            fetchers,
            publishers,
            run: raw.run_configuration,
        };

        config.run.validate()?;
        config.check_enabled()?;

        log::debug!(
            target: LOG_TARGET,
            "Declared {} fetcher(s) and {} publisher(s); {} fetcher(s) and {} publisher(s) enabled",
            config.fetchers.len(),
            config.publishers.len(),
            config.run.fetchers.len(),
            config.run.publishers.len()
        );

        Ok(config)
    }

    #[must_use]
    pub fn fetcher(&self, name: &str) -> Option<&FetcherConfig> {
        self.fetchers.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn publisher(&self, name: &str) -> Option<&PublisherConfig> {
        self.publishers.iter().find(|p| p.name == name)
    }

    /// The fetchers listed in `runConfiguration.fetchers`, in the order they are listed there.
    pub fn enabled_fetchers(&self) -> impl Iterator<Item = &FetcherConfig> {
        self.run.fetchers.iter().filter_map(|name| self.fetcher(name))
    }

    /// The publishers listed in `runConfiguration.publishers`, in the order they are listed there.
    pub fn enabled_publishers(&self) -> impl Iterator<Item = &PublisherConfig> {
        self.run.publishers.iter().filter_map(|name| self.publisher(name))
    }

    fn check_enabled(&self) -> Result<(), ConfigError> {
        for name in &self.run.fetchers {
            if self.fetcher(name).is_none() {
                return Err(ConfigError::Undeclared {
                    entry: "runConfiguration.fetchers".to_string(),
                    section: "Fetchers",
                    name: name.clone(),
                });
            }
        }

        for name in &self.run.publishers {
            if self.publisher(name).is_none() {
                return Err(ConfigError::Undeclared {
                    entry: "runConfiguration.publishers".to_string(),
                    section: "Publishers",
                    name: name.clone(),
                });
            }
        }

        Ok(())
    }
}

fn parse_entries<T>(
    mapping: &Mapping,
    section: &str,
    parse: impl Fn(&str, &Value) -> Result<T, ConfigError>,
) -> Result<Vec<T>, ConfigError> {
    mapping
        .iter()
        .map(|(name, value)| {
            let Some(name) = name.as_str() else {
                return Err(ConfigError::invalid(section, format!("entry names must be strings, found {name:?}")));
            };
            parse(name, value)
        })
        .collect()
}
