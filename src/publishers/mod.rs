//! Backends that receive metric results and own dashboards
//!
//! Every publisher implements [`Publish`]. Results are delivered in chunks of the publisher's
//! batch size, each chunk all-or-nothing. Dashboard reconciliation brings the publisher's
//! dashboards in line with the loaded metric definitions and is idempotent.

mod console;
mod datadog;

pub use console::ConsolePublisher;
pub use datadog::{DashboardType, DatadogPublisher};

use crate::config::{Config, ConfigError, PublisherConfig, PublisherKind};
use crate::metrics::{MetricDefinition, MetricResult};
use core::future::Future;
use core::ops::AddAssign;
use core::time::Duration;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

const LOG_TARGET: &str = "publishers";

/// Request timeout used by HTTP publishers.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A delivery or reconciliation that did not fully succeed.
#[derive(Debug, Error)]
#[error("publisher '{publisher}' failed: {cause:#}")]
pub struct PublishError {
    pub publisher: Arc<str>,
    pub cause: ohno::AppError,

    /// Results that reached the backend before or despite the failure
    pub delivered: usize,

    /// Results that did not reach the backend
    pub failed: usize,
}

impl PublishError {
    #[must_use]
    pub fn new(publisher: impl Into<Arc<str>>, cause: impl Into<ohno::AppError>) -> Self {
        Self {
            publisher: publisher.into(),
            cause: cause.into(),
            delivered: 0,
            failed: 0,
        }
    }

    #[must_use]
    pub const fn with_counts(mut self, delivered: usize, failed: usize) -> Self {
        self.delivered = delivered;
        self.failed = failed;
        self
    }
}

/// What a dashboard reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub dashboards_created: usize,
    pub dashboards_updated: usize,
    pub widgets_added: usize,
    pub widgets_removed: usize,
    pub descriptions_updated: usize,
}

impl ReconcileReport {
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        self.dashboards_created == 0 && self.dashboards_updated == 0 && self.descriptions_updated == 0
    }
}

impl AddAssign for ReconcileReport {
    fn add_assign(&mut self, other: Self) {
        self.dashboards_created += other.dashboards_created;
        self.dashboards_updated += other.dashboards_updated;
        self.widgets_added += other.widgets_added;
        self.widgets_removed += other.widgets_removed;
        self.descriptions_updated += other.descriptions_updated;
    }
}

/// A backend for metric results.
pub trait Publish: Send + Sync {
    fn name(&self) -> &str;

    /// Maximum number of results sent in one request.
    fn batch_size(&self) -> usize;

    /// Delivers `results` in chunks of [`Self::batch_size`].
    ///
    /// Every chunk is attempted even after a failure; the error carries the delivered and failed counts.
    fn publish(&self, results: &[MetricResult]) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Makes the publisher's dashboards match the definitions bound to it.
    fn reconcile_dashboard(&self, definitions: &[MetricDefinition]) -> impl Future<Output = Result<ReconcileReport, PublishError>> + Send;

    fn close(&self) {}
}

/// The publisher types known to the configuration.
#[derive(Debug)]
pub enum Publisher {
    Datadog(DatadogPublisher),
    Console(ConsolePublisher),
}

impl Publisher {
    pub fn from_config(config: &PublisherConfig) -> Result<Self, ConfigError> {
        Ok(match config.kind {
            PublisherKind::Datadog => Self::Datadog(DatadogPublisher::from_config(config, REQUEST_TIMEOUT)?),
            PublisherKind::Console => Self::Console(ConsolePublisher::from_config(config)),
        })
    }
}

impl Publish for Publisher {
    fn name(&self) -> &str {
        match self {
            Self::Datadog(p) => p.name(),
            Self::Console(p) => p.name(),
        }
    }

    fn batch_size(&self) -> usize {
        match self {
            Self::Datadog(p) => p.batch_size(),
            Self::Console(p) => p.batch_size(),
        }
    }

    async fn publish(&self, results: &[MetricResult]) -> Result<(), PublishError> {
        match self {
            Self::Datadog(p) => p.publish(results).await,
            Self::Console(p) => p.publish(results).await,
        }
    }

    async fn reconcile_dashboard(&self, definitions: &[MetricDefinition]) -> Result<ReconcileReport, PublishError> {
        match self {
            Self::Datadog(p) => p.reconcile_dashboard(definitions).await,
            Self::Console(p) => p.reconcile_dashboard(definitions).await,
        }
    }

    fn close(&self) {
        match self {
            Self::Datadog(p) => p.close(),
            Self::Console(p) => p.close(),
        }
    }
}

/// A registered publisher behind its own lock, so deliveries to it never interleave.
#[derive(Debug)]
pub struct PublisherSlot<P> {
    name: Arc<str>,
    publisher: Mutex<P>,
}

impl<P: Publish> PublisherSlot<P> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delivers results while holding the publisher's lock.
    pub async fn publish(&self, results: &[MetricResult]) -> Result<(), PublishError> {
        let publisher = self.publisher.lock().await;
        publisher.publish(results).await
    }

    pub async fn reconcile_dashboard(&self, definitions: &[MetricDefinition]) -> Result<ReconcileReport, PublishError> {
        let publisher = self.publisher.lock().await;
        publisher.reconcile_dashboard(definitions).await
    }

    fn close(&mut self) {
        self.publisher.get_mut().close();
    }
}

/// The live publishers of a run, in the order they were enabled.
#[derive(Debug)]
pub struct PublisherRegistry<P = Publisher> {
    slots: Vec<PublisherSlot<P>>,
}

impl<P: Publish> Default for PublisherRegistry<P> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<P: Publish> PublisherRegistry<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a publisher, replacing any previous one with the same name.
    pub fn insert(&mut self, publisher: P) {
        let name: Arc<str> = Arc::from(publisher.name());
        self.slots.retain(|slot| slot.name != name);
        self.slots.push(PublisherSlot {
            name,
            publisher: Mutex::new(publisher),
        });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PublisherSlot<P>> {
        self.slots.iter().find(|slot| &*slot.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublisherSlot<P>> {
        self.slots.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            log::debug!(target: LOG_TARGET, "Closing publisher '{}'", slot.name);
            slot.close();
        }
    }
}

impl PublisherRegistry<Publisher> {
    /// Builds every publisher enabled in the run configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for publisher_config in config.enabled_publishers() {
            log::debug!(
                target: LOG_TARGET,
                "Registering {} publisher '{}' with batch size {}",
                publisher_config.kind,
                publisher_config.name,
                publisher_config.batch_size
            );
            registry.insert(Publisher::from_config(publisher_config)?);
        }

        Ok(registry)
    }
}
