use camino::Utf8PathBuf;
use thiserror::Error;

/// A problem found while loading the configuration file or the metric definitions.
///
/// Configuration errors are fatal: they are raised before any run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse '{path}': {source}")]
    Yaml {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{entry}: unknown type '{kind}'")]
    UnknownType { entry: String, kind: String },

    #[error("{entry}: missing required field '{field}'")]
    MissingField { entry: String, field: String },

    #[error("{entry}: invalid value for '{field}': {reason}")]
    InvalidValue { entry: String, field: String, reason: String },

    #[error("{entry}: environment variable '{var}' is not set")]
    MissingEnv { entry: String, var: String },

    #[error("{entry}: refers to undeclared {section} entry '{name}'")]
    Undeclared {
        entry: String,
        section: &'static str,
        name: String,
    },

    #[error("metric name '{name}' is defined in both '{first}' and '{second}'")]
    DuplicateMetric {
        name: String,
        first: Utf8PathBuf,
        second: Utf8PathBuf,
    },

    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("unknown run mode '{0}', expected 'master' or 'updateBoards'")]
    UnknownMode(String),

    #[error("{entry}: {reason}")]
    Invalid { entry: String, reason: String },
}

impl ConfigError {
    pub(crate) fn missing(entry: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            entry: entry.into(),
            field: field.into(),
        }
    }

    pub(crate) fn invalid(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(entry: impl Into<String>, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            entry: entry.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
