use crate::config::{Config, ConfigError};
use crate::fetchers::{Fetch, Fetcher, FetcherRegistry};
use crate::publishers::{Publish, Publisher, PublisherRegistry};

const LOG_TARGET: &str = "   context";

/// The connectors of one run.
///
/// Dropping the context tears it down; [`Self::tear_down`] may also be called explicitly and is
/// idempotent.
#[derive(Debug)]
pub struct RunContext<F: Fetch = Fetcher, P: Publish = Publisher> {
    fetchers: FetcherRegistry<F>,
    publishers: PublisherRegistry<P>,
    torn_down: bool,
}

impl RunContext {
    /// Builds every enabled fetcher and publisher. No connection is opened yet.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let context = Self::new(FetcherRegistry::from_config(config)?, PublisherRegistry::from_config(config)?);

        log::info!(
            target: LOG_TARGET,
            "Run context ready with {} fetcher(s) and {} publisher(s)",
            context.fetchers.len(),
            context.publishers.len()
        );

        Ok(context)
    }
}

impl<F: Fetch, P: Publish> RunContext<F, P> {
    #[must_use]
    pub const fn new(fetchers: FetcherRegistry<F>, publishers: PublisherRegistry<P>) -> Self {
        Self {
            fetchers,
            publishers,
            torn_down: false,
        }
    }

    #[must_use]
    pub const fn fetchers(&self) -> &FetcherRegistry<F> {
        &self.fetchers
    }

    #[must_use]
    pub const fn publishers(&self) -> &PublisherRegistry<P> {
        &self.publishers
    }

    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Closes every connector. Later calls do nothing.
    pub fn tear_down(&mut self) {
        if self.torn_down {
            return;
        }

        self.torn_down = true;
        self.fetchers.close_all();
        self.publishers.close_all();

        log::debug!(target: LOG_TARGET, "Run context torn down");
    }
}

impl<F: Fetch, P: Publish> Drop for RunContext<F, P> {
    fn drop(&mut self) {
        self.tear_down();
    }
}
