//! Scripted connectors for engine tests.

use crate::config::Params;
use crate::engine::RunContext;
use crate::fetchers::{Fetch, FetchError, FetcherRegistry};
use crate::metrics::{MetricDefinition, MetricResult};
use crate::publishers::{Publish, PublishError, PublisherRegistry, ReconcileReport};
use camino::Utf8Path;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use ohno::app_err;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Answers queries from a fixed table; unknown queries fail.
#[derive(Debug)]
pub struct StubFetcher {
    name: String,
    values: HashMap<String, f64>,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl StubFetcher {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            values: HashMap::new(),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with(mut self, query: &str, value: f64) -> Self {
        let _ = self.values.insert(query.to_string(), value);
        self
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Fetch for StubFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, params: &Params) -> Result<f64, FetchError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let query = params.get("query").map_or("", String::as_str);
        self.values
            .get(query)
            .copied()
            .ok_or_else(|| FetchError::new(self.name.as_str(), app_err!("no answer for '{query}'")))
    }

    fn close(&self) {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every delivery; optionally fails all of them.
#[derive(Debug)]
pub struct StubPublisher {
    name: String,
    batch_size: usize,
    fail: bool,
    pub deliveries: Arc<Mutex<Vec<Vec<MetricResult>>>>,
    pub reconciled: Arc<Mutex<Vec<Vec<String>>>>,
    pub closes: Arc<AtomicUsize>,
}

impl StubPublisher {
    pub fn new(name: &str, batch_size: usize) -> Self {
        Self {
            name: name.to_string(),
            batch_size,
            fail: false,
            deliveries: Arc::new(Mutex::new(Vec::new())),
            reconciled: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn delivery_sizes(deliveries: &Mutex<Vec<Vec<MetricResult>>>) -> Vec<usize> {
        deliveries.lock().unwrap().iter().map(Vec::len).collect()
    }
}

impl Publish for StubPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn publish(&self, results: &[MetricResult]) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::new(self.name.as_str(), app_err!("backend unavailable")).with_counts(0, results.len()));
        }

        self.deliveries.lock().unwrap().push(results.to_vec());
        Ok(())
    }

    async fn reconcile_dashboard(&self, definitions: &[MetricDefinition]) -> Result<ReconcileReport, PublishError> {
        if self.fail {
            return Err(PublishError::new(self.name.as_str(), app_err!("backend unavailable")));
        }

        self.reconciled
            .lock()
            .unwrap()
            .push(definitions.iter().map(|d| d.name.to_string()).collect());

        Ok(ReconcileReport {
            dashboards_updated: 1,
            ..ReconcileReport::default()
        })
    }

    fn close(&self) {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn context(fetchers: Vec<StubFetcher>, publishers: Vec<StubPublisher>) -> RunContext<StubFetcher, StubPublisher> {
    context_with_timeout(fetchers, publishers, Duration::from_secs(5))
}

pub fn context_with_timeout(
    fetchers: Vec<StubFetcher>,
    publishers: Vec<StubPublisher>,
    timeout: Duration,
) -> RunContext<StubFetcher, StubPublisher> {
    let mut fetcher_registry = FetcherRegistry::new(timeout);
    for fetcher in fetchers {
        fetcher_registry.insert(fetcher);
    }

    let mut publisher_registry = PublisherRegistry::new();
    for publisher in publishers {
        publisher_registry.insert(publisher);
    }

    RunContext::new(fetcher_registry, publisher_registry)
}

pub fn definition(yaml: &str) -> MetricDefinition {
    MetricDefinition::from_yaml(yaml, Utf8Path::new("tests/inline.yaml")).unwrap()
}

/// A quality definition reading `query` from `db_a` and publishing to `out`.
pub fn quality(name: &str, query: &str) -> MetricDefinition {
    definition(&format!(
        "name: {name}\ntype: quality\nteam: data\nmetrics:\n  main:\n    fetchers:\n      db_a: {{ query: '{query}' }}\n    publishers:\n      out: {{}}\n"
    ))
}
