use crate::config::{Config, ConfigError, Params, params_from_mapping};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use strum::{Display, EnumIter, EnumString};

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("invalid regex"));

/// The two kinds of checks a definition can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Display, EnumIter, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricType {
    /// One fetcher, the fetched value is the result
    Quality,

    /// Two fetchers, combined by the definition's [`Action`]
    Consistency,
}

/// How the two values of a consistency check are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    #[default]
    None,
    Difference,
    Division,
}

impl Action {
    /// Combines the values fetched in declaration order.
    ///
    /// Returns `None` for a division by exactly zero.
    #[must_use]
    pub fn combine(self, first: f64, second: f64) -> Option<f64> {
        match self {
            Self::None => Some(first),
            Self::Difference => Some(first - second),
            Self::Division => (second != 0.0).then(|| first / second),
        }
    }
}

/// A reference from a sub-metric to a fetcher or publisher, with its per-binding parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: Arc<str>,
    pub params: Params,
}

impl Binding {
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubMetric {
    pub key: Arc<str>,
    pub active: bool,
    pub fetchers: Vec<Binding>,
    pub publishers: Arc<[Binding]>,
    pub tags: BTreeMap<String, String>,
}

impl SubMetric {
    #[must_use]
    pub fn publisher(&self, name: &str) -> Option<&Binding> {
        self.publishers.iter().find(|b| &*b.name == name)
    }
}

/// One parsed and validated metric definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: Arc<str>,
    pub description: String,
    pub metric_type: MetricType,
    pub action: Action,
    pub team: Arc<str>,
    pub sub_metrics: Vec<SubMetric>,

    /// The file the definition was loaded from
    pub source: Utf8PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type")]
    metric_type: MetricType,
    #[serde(default)]
    action: Action,
    team: String,
    metrics: Mapping,
}

const fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSubMetric {
    #[serde(default = "default_active")]
    active: bool,
    fetchers: Mapping,
    #[serde(default)]
    publishers: Mapping,
    #[serde(default)]
    tags: Mapping,
}

impl MetricDefinition {
    /// Parses a definition and checks its structural invariants.
    ///
    /// References to fetchers and publishers are checked separately by [`Self::validate_against`].
    pub fn from_yaml(text: &str, source: &Utf8Path) -> Result<Self, ConfigError> {
        let yaml_error = |source_err| ConfigError::Yaml {
            path: source.to_path_buf(),
            source: source_err,
        };

        let raw: RawDefinition = serde_yaml::from_str(text).map_err(yaml_error)?;

        if !NAME_PATTERN.is_match(&raw.name) {
            return Err(ConfigError::invalid_value(
                source.as_str(),
                "name",
                format!("'{}' must only contain letters, digits and underscores", raw.name),
            ));
        }

        if raw.metrics.is_empty() {
            return Err(ConfigError::invalid(source.as_str(), "at least one sub-metric is required"));
        }

        match (raw.metric_type, raw.action) {
            (MetricType::Quality, Action::None) => {}
            (MetricType::Quality, action) => {
                return Err(ConfigError::invalid_value(
                    source.as_str(),
                    "action",
                    format!("quality checks take no action, found '{action}'"),
                ));
            }
            (MetricType::Consistency, Action::None) => {
                return Err(ConfigError::invalid_value(
                    source.as_str(),
                    "action",
                    "consistency checks need 'difference' or 'division'",
                ));
            }
            (MetricType::Consistency, _) => {}
        }

        let expected_fetchers = match raw.metric_type {
            MetricType::Quality => 1,
            MetricType::Consistency => 2,
        };

        let mut sub_metrics = Vec::with_capacity(raw.metrics.len());
        for (key, value) in raw.metrics {
            let Some(key) = key.as_str().map(str::to_string) else {
                return Err(ConfigError::invalid(source.as_str(), format!("sub-metric keys must be strings, found {key:?}")));
            };

            let entry = format!("{source}: metrics.{key}");
            let raw_sub: RawSubMetric = serde_yaml::from_value(value).map_err(yaml_error)?;

            let fetchers = bindings(&entry, "fetchers", &raw_sub.fetchers)?;
            if fetchers.len() != expected_fetchers {
                return Err(ConfigError::invalid(
                    entry,
                    format!(
                        "{} checks bind exactly {expected_fetchers} fetcher(s), found {}",
                        raw.metric_type,
                        fetchers.len()
                    ),
                ));
            }

            let publishers = bindings(&entry, "publishers", &raw_sub.publishers)?;
            let tags = params_from_mapping(&format!("{entry}.tags"), &raw_sub.tags)?;

            sub_metrics.push(SubMetric {
                key: key.into(),
                active: raw_sub.active,
                fetchers,
                publishers: publishers.into(),
                tags,
            });
        }

        Ok(Self {
            name: raw.name.into(),
            description: raw.description.unwrap_or_default().trim().to_string(),
            metric_type: raw.metric_type,
            action: raw.action,
            team: raw.team.into(),
            sub_metrics,
            source: source.to_path_buf(),
        })
    }

    /// Checks that every binding names a declared connector and carries the parameters its type needs.
    pub fn validate_against(&self, config: &Config) -> Result<(), ConfigError> {
        for sub in &self.sub_metrics {
            for binding in &sub.fetchers {
                let entry = format!("{}: metrics.{}.fetchers.{}", self.source, sub.key, binding.name);
                let fetcher = config.fetcher(&binding.name).ok_or_else(|| ConfigError::Undeclared {
                    entry: entry.clone(),
                    section: "Fetchers",
                    name: binding.name.to_string(),
                })?;
                fetcher.validate_binding(&entry, &binding.params)?;
            }

            for binding in sub.publishers.iter() {
                let entry = format!("{}: metrics.{}.publishers.{}", self.source, sub.key, binding.name);
                let publisher = config.publisher(&binding.name).ok_or_else(|| ConfigError::Undeclared {
                    entry: entry.clone(),
                    section: "Publishers",
                    name: binding.name.to_string(),
                })?;
                publisher.validate_binding(&entry, &binding.params)?;
            }
        }

        Ok(())
    }

    /// Whether at least one sub-metric is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sub_metrics.iter().any(|s| s.active)
    }

    pub fn active_sub_metrics(&self) -> impl Iterator<Item = &SubMetric> {
        self.sub_metrics.iter().filter(|s| s.active)
    }

    /// Whether any active sub-metric publishes to the named publisher.
    #[must_use]
    pub fn binds_publisher(&self, publisher: &str) -> bool {
        self.active_sub_metrics().any(|s| s.publisher(publisher).is_some())
    }
}

fn bindings(entry: &str, section: &str, mapping: &Mapping) -> Result<Vec<Binding>, ConfigError> {
    mapping
        .iter()
        .map(|(name, value)| {
            let Some(name) = name.as_str() else {
                return Err(ConfigError::invalid(entry, format!("{section} names must be strings, found {name:?}")));
            };

            let binding_entry = format!("{entry}.{section}.{name}");
            let params = match value {
                Value::Mapping(params) => params_from_mapping(&binding_entry, params)?,
                Value::Null => Params::new(),
                _ => return Err(ConfigError::invalid(binding_entry, "expected a mapping of parameters")),
            };

            Ok(Binding {
                name: name.into(),
                params,
            })
        })
        .collect()
}
