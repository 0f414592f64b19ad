//! Data sources that turn a query into a single number
//!
//! Every fetcher implements [`Fetch`]: one read-only round trip per call, no caching, and a
//! [`FetchError`] naming the fetcher when anything goes wrong. The concrete fetcher types are a
//! closed set gathered in [`Fetcher`], chosen from the configuration `type` string at startup.

mod http;
mod postgres;

pub use http::HttpFetcher;
pub use postgres::PostgresFetcher;

use crate::config::{Config, ConfigError, FetcherConfig, FetcherKind, Params};
use core::future::Future;
use core::time::Duration;
use ohno::app_err;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

const LOG_TARGET: &str = "  fetchers";

/// A fetch that did not produce a number.
#[derive(Debug, Error)]
#[error("fetcher '{fetcher}' failed: {cause:#}")]
pub struct FetchError {
    pub fetcher: Arc<str>,
    pub cause: ohno::AppError,
}

impl FetchError {
    #[must_use]
    pub fn new(fetcher: impl Into<Arc<str>>, cause: impl Into<ohno::AppError>) -> Self {
        Self {
            fetcher: fetcher.into(),
            cause: cause.into(),
        }
    }
}

/// A source of single numeric values.
///
/// Implementations must tolerate concurrent calls.
pub trait Fetch: Send + Sync {
    fn name(&self) -> &str;

    /// Performs one round trip using the binding parameters of a sub-metric.
    fn fetch(&self, params: &Params) -> impl Future<Output = Result<f64, FetchError>> + Send;

    /// Releases any connection held by the fetcher.
    fn close(&self) {}
}

/// The fetcher types known to the configuration.
#[derive(Debug)]
pub enum Fetcher {
    Postgres(PostgresFetcher),
    Http(HttpFetcher),
}

impl Fetcher {
    /// Builds the fetcher described by a configuration entry.
    ///
    /// No connection is opened here.
    pub fn from_config(config: &FetcherConfig, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(match config.kind {
            FetcherKind::Postgres => Self::Postgres(PostgresFetcher::from_config(config, timeout)?),
            FetcherKind::Http => Self::Http(HttpFetcher::from_config(config, timeout)?),
        })
    }
}

impl Fetch for Fetcher {
    fn name(&self) -> &str {
        match self {
            Self::Postgres(f) => f.name(),
            Self::Http(f) => f.name(),
        }
    }

    async fn fetch(&self, params: &Params) -> Result<f64, FetchError> {
        match self {
            Self::Postgres(f) => f.fetch(params).await,
            Self::Http(f) => f.fetch(params).await,
        }
    }

    fn close(&self) {
        match self {
            Self::Postgres(f) => f.close(),
            Self::Http(f) => f.close(),
        }
    }
}

/// The live fetchers of a run, keyed by name.
#[derive(Debug)]
pub struct FetcherRegistry<F = Fetcher> {
    fetchers: HashMap<Arc<str>, F>,
    timeout: Duration,
}

impl<F: Fetch> FetcherRegistry<F> {
    /// Creates an empty registry whose fetches are bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            fetchers: HashMap::new(),
            timeout,
        }
    }

    /// Adds a fetcher, replacing any previous one with the same name.
    pub fn insert(&mut self, fetcher: F) {
        let _ = self.fetchers.insert(Arc::from(fetcher.name()), fetcher);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&F> {
        self.fetchers.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Calls `fetcher`, turning an overrun of the registry timeout into a [`FetchError`].
    pub async fn fetch_with_timeout(&self, fetcher: &F, params: &Params) -> Result<f64, FetchError> {
        tokio::time::timeout(self.timeout, fetcher.fetch(params))
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::new(
                    fetcher.name(),
                    app_err!("no answer within {:.1}s", self.timeout.as_secs_f64()),
                ))
            })
    }

    pub fn close_all(&self) {
        for (name, fetcher) in &self.fetchers {
            log::debug!(target: LOG_TARGET, "Closing fetcher '{name}'");
            fetcher.close();
        }
    }
}

impl FetcherRegistry<Fetcher> {
    /// Builds every fetcher enabled in the run configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut registry = Self::new(config.run.fetch_timeout);
        for fetcher_config in config.enabled_fetchers() {
            log::debug!(target: LOG_TARGET, "Registering {} fetcher '{}'", fetcher_config.kind, fetcher_config.name);
            registry.insert(Fetcher::from_config(fetcher_config, config.run.fetch_timeout)?);
        }

        Ok(registry)
    }
}

/// Interprets the text of a fetched scalar as a number.
///
/// Besides decimal numbers, `t`/`true` and `f`/`false` are accepted as 1 and 0.
pub(crate) fn parse_scalar(text: &str) -> crate::Result<f64> {
    let text = text.trim();
    let value = match text {
        "t" | "true" => 1.0,
        "f" | "false" => 0.0,
        _ => text
            .parse::<f64>()
            .map_err(|e| app_err!("value '{text}' is not numeric: {e}"))?,
    };

    if !value.is_finite() {
        return Err(app_err!("value '{text}' is not a finite number"));
    }

    Ok(value)
}
