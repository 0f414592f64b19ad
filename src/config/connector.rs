use crate::config::ConfigError;
use crate::publishers::DashboardType;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use url::Url;

/// String parameters of a connector or of a binding to one.
pub type Params = BTreeMap<String, String>;

const ENV_PREFIX: &str = "env:";
const DEFAULT_BATCH_SIZE: usize = 100;

/// The supported fetcher types, selected by the `type` key of a `Fetchers` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum FetcherKind {
    #[strum(serialize = "PostgresDB")]
    Postgres,

    #[strum(serialize = "HttpApi")]
    Http,
}

impl FetcherKind {
    /// Connection parameters that every entry of this type must carry.
    #[must_use]
    pub const fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["host", "database", "user", "password"],
            Self::Http => &["baseUrl"],
        }
    }

    /// Parameters that every metric binding to a fetcher of this type must carry.
    #[must_use]
    pub const fn required_binding_params(self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["query"],
            Self::Http => &["path"],
        }
    }
}

/// The supported publisher types, selected by the `type` key of a `Publishers` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum PublisherKind {
    Datadog,
    Console,
}

impl PublisherKind {
    #[must_use]
    pub const fn required_credentials(self) -> &'static [&'static str] {
        match self {
            Self::Datadog => &["apiKey", "appKey"],
            Self::Console => &[],
        }
    }

    #[must_use]
    pub const fn required_binding_params(self) -> &'static [&'static str] {
        match self {
            Self::Datadog => &["dashboardName", "typeOfDashboard"],
            Self::Console => &[],
        }
    }
}

/// A validated entry of the `Fetchers` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    pub name: String,
    pub kind: FetcherKind,
    pub params: Params,
}

impl FetcherConfig {
    pub(crate) fn from_yaml(name: &str, value: &Value) -> Result<Self, ConfigError> {
        let entry = format!("Fetchers.{name}");
        let mut params = connector_params(&entry, value)?;
        let kind_text = take_kind(&entry, &mut params)?;
        let Ok(kind) = kind_text.parse::<FetcherKind>() else {
            return Err(ConfigError::UnknownType { entry, kind: kind_text });
        };

        require(&entry, &params, kind.required_params())?;

        match kind {
            FetcherKind::Postgres => {
                if let Some(port) = params.get("port") {
                    let _ = port
                        .parse::<u16>()
                        .map_err(|e| ConfigError::invalid_value(&entry, "port", e.to_string()))?;
                }
            }
            FetcherKind::Http => {
                validate_url(&entry, "baseUrl", &params["baseUrl"])?;
            }
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            params,
        })
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Checks the parameters a metric definition binds to this fetcher.
    pub(crate) fn validate_binding(&self, entry: &str, params: &Params) -> Result<(), ConfigError> {
        require(entry, params, self.kind.required_binding_params())
    }
}

/// A validated entry of the `Publishers` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub name: String,
    pub kind: PublisherKind,
    pub credentials: Params,
    pub batch_size: usize,
}

impl PublisherConfig {
    pub(crate) fn from_yaml(name: &str, value: &Value) -> Result<Self, ConfigError> {
        let entry = format!("Publishers.{name}");
        let mut credentials = connector_params(&entry, value)?;
        let kind_text = take_kind(&entry, &mut credentials)?;
        let Ok(kind) = kind_text.parse::<PublisherKind>() else {
            return Err(ConfigError::UnknownType { entry, kind: kind_text });
        };

        let batch_size = match credentials.remove("batchSize") {
            None => DEFAULT_BATCH_SIZE,
            Some(text) => match text.parse::<usize>() {
                Ok(size) if size >= 1 => size,
                _ => return Err(ConfigError::invalid_value(&entry, "batchSize", "expected an integer of at least 1")),
            },
        };

        require(&entry, &credentials, kind.required_credentials())?;

        if kind == PublisherKind::Datadog
            && let Some(api_url) = credentials.get("apiUrl")
        {
            validate_url(&entry, "apiUrl", api_url)?;
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            credentials,
            batch_size,
        })
    }

    #[must_use]
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials.get(key).map(String::as_str)
    }

    /// Checks the parameters a metric definition binds to this publisher.
    pub(crate) fn validate_binding(&self, entry: &str, params: &Params) -> Result<(), ConfigError> {
        require(entry, params, self.kind.required_binding_params())?;

        if self.kind == PublisherKind::Datadog {
            let kind = &params["typeOfDashboard"];
            if kind.parse::<DashboardType>().is_err() {
                return Err(ConfigError::invalid_value(
                    entry,
                    "typeOfDashboard",
                    format!("'{kind}' is neither 'timeboard' nor 'screenboard'"),
                ));
            }
        }

        Ok(())
    }
}

/// Converts a YAML mapping of scalars into string parameters.
///
/// Nested mappings and sequences are rejected; `null` becomes an empty string.
pub(crate) fn params_from_mapping(entry: &str, mapping: &Mapping) -> Result<Params, ConfigError> {
    let mut params = Params::new();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            return Err(ConfigError::invalid(entry, format!("parameter names must be strings, found {key:?}")));
        };

        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => return Err(ConfigError::invalid_value(entry, key, "expected a scalar value")),
        };

        let _ = params.insert(key.to_string(), value);
    }

    Ok(params)
}

fn connector_params(entry: &str, value: &Value) -> Result<Params, ConfigError> {
    let Value::Mapping(mapping) = value else {
        return Err(ConfigError::invalid(entry, "expected a mapping of parameters"));
    };

    let mut params = params_from_mapping(entry, mapping)?;
    resolve_env(entry, &mut params)?;
    Ok(params)
}

fn take_kind(entry: &str, params: &mut Params) -> Result<String, ConfigError> {
    params.remove("type").ok_or_else(|| ConfigError::missing(entry, "type"))
}

/// Replaces every `env:NAME` value with the content of the environment variable `NAME`.
fn resolve_env(entry: &str, params: &mut Params) -> Result<(), ConfigError> {
    for value in params.values_mut() {
        if let Some(var) = value.strip_prefix(ENV_PREFIX) {
            let var = var.trim();
            let Ok(resolved) = std::env::var(var) else {
                return Err(ConfigError::MissingEnv {
                    entry: entry.to_string(),
                    var: var.to_string(),
                });
            };
            *value = resolved;
        }
    }

    Ok(())
}

fn require(entry: &str, params: &Params, fields: &[&str]) -> Result<(), ConfigError> {
    for field in fields {
        match params.get(*field) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(ConfigError::missing(entry, *field)),
        }
    }

    Ok(())
}

fn validate_url(entry: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    let _ = Url::parse(value).map_err(|e| ConfigError::invalid_value(entry, field, e.to_string()))?;
    Ok(())
}
