//! Datadog publisher
//!
//! Every result is sent as two gauge series: a detailed series `<prefix>.<dashboard>.<metric>`
//! and a summary series `<prefix>.<dashboard>` tagged with `test_name:<metric>`. Dashboards are
//! looked up by title, created when missing and otherwise diff-updated. Dashboards created here
//! carry a marker description; once no binding names one of them, its metric widgets are removed.

mod client;
mod dashboard;

pub use dashboard::DashboardType;

use crate::config::{ConfigError, PublisherConfig};
use crate::metrics::{MetricDefinition, MetricResult};
use crate::publishers::{Publish, PublishError, ReconcileReport};
use client::{Client, Dashboard, Series};
use core::time::Duration;
use dashboard::{detail_series, plan_widgets, summary_series};
use std::collections::BTreeMap;
use std::sync::Arc;

const LOG_TARGET: &str = "   datadog";
const DEFAULT_API_URL: &str = "https://api.datadoghq.com";
const DEFAULT_PREFIX: &str = "bigeye";
const MANAGED_DESCRIPTION: &str = "Managed by bigeye";

/// The metrics one dashboard should show, with their descriptions.
#[derive(Debug, Default)]
struct Board<'a> {
    metrics: Vec<(&'a str, &'a str)>,
}

impl<'a> Board<'a> {
    fn add(&mut self, metric: &'a str, description: &'a str) {
        if !self.metrics.iter().any(|(name, _)| *name == metric) {
            self.metrics.push((metric, description));
        }
    }
}

#[derive(Debug)]
pub struct DatadogPublisher {
    name: Arc<str>,
    client: Client,
    prefix: String,
    batch_size: usize,
}

impl DatadogPublisher {
    pub fn from_config(config: &PublisherConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let entry = format!("Publishers.{}", config.name);
        let api_key = config.credential("apiKey").ok_or_else(|| ConfigError::missing(&entry, "apiKey"))?;
        let app_key = config.credential("appKey").ok_or_else(|| ConfigError::missing(&entry, "appKey"))?;
        let api_url = config.credential("apiUrl").unwrap_or(DEFAULT_API_URL);

        let client = Client::new(api_url, api_key, app_key, timeout).map_err(|e| ConfigError::invalid(&entry, format!("{e:#}")))?;

        Ok(Self {
            name: Arc::from(config.name.as_str()),
            client,
            prefix: config.credential("metricPrefix").unwrap_or(DEFAULT_PREFIX).to_string(),
            batch_size: config.batch_size,
        })
    }

    fn fail(&self, cause: ohno::AppError) -> PublishError {
        PublishError::new(Arc::clone(&self.name), cause)
    }

    /// The detailed and summary series of one result, if the result is bound to this publisher.
    fn series(&self, result: &MetricResult) -> Option<[Series; 2]> {
        let binding = result.publisher_binding(&self.name)?;
        let dashboard = binding.param("dashboardName")?;
        let timestamp = result.timestamp.timestamp();
        let tags: Vec<String> = result.tag_pairs().collect();

        let mut summary_tags = tags.clone();
        summary_tags.push(format!("test_name:{}", result.metric));

        Some([
            Series {
                metric: detail_series(&self.prefix, dashboard, &result.metric),
                points: vec![(timestamp, result.value)],
                kind: "gauge",
                tags,
            },
            Series {
                metric: summary_series(&self.prefix, dashboard),
                points: vec![(timestamp, result.value)],
                kind: "gauge",
                tags: summary_tags,
            },
        ])
    }

    /// Groups the metrics bound to this publisher by dashboard name and type.
    fn boards<'a>(&self, definitions: &'a [MetricDefinition]) -> BTreeMap<(&'a str, DashboardType), Board<'a>> {
        let mut boards: BTreeMap<(&str, DashboardType), Board<'_>> = BTreeMap::new();

        for definition in definitions {
            for sub in definition.active_sub_metrics() {
                let Some(binding) = sub.publisher(&self.name) else {
                    continue;
                };

                let (Some(name), Some(kind)) = (
                    binding.param("dashboardName"),
                    binding.param("typeOfDashboard").and_then(|k| k.parse::<DashboardType>().ok()),
                ) else {
                    continue;
                };

                boards
                    .entry((name, kind))
                    .or_default()
                    .add(&definition.name, &definition.description);
            }
        }

        boards
    }

    async fn reconcile_board(
        &self,
        name: &str,
        kind: DashboardType,
        board: &Board<'_>,
        existing_id: Option<&str>,
    ) -> crate::Result<ReconcileReport> {
        let metrics: Vec<&str> = board.metrics.iter().map(|(metric, _)| *metric).collect();

        if let Some(id) = existing_id {
            return self.update_board(name, id, &metrics).await;
        }

        let plan = plan_widgets(&[], &summary_series(&self.prefix, name), &metrics, kind == DashboardType::Screenboard);
        let dashboard = Dashboard {
            id: None,
            title: name.to_string(),
            description: Some(MANAGED_DESCRIPTION.to_string()),
            layout_type: kind.layout_type().to_string(),
            widgets: plan.widgets,
            template_variables: Vec::new(),
        };

        let id = self.client.create_dashboard(&dashboard).await?;
        log::info!(target: LOG_TARGET, "Created {kind} '{name}' ({id}) with {} widget(s)", plan.added);

        Ok(ReconcileReport {
            dashboards_created: 1,
            widgets_added: plan.added,
            ..ReconcileReport::default()
        })
    }

    /// Diffs an existing dashboard against `metrics` and writes it back when anything changed.
    async fn update_board(&self, name: &str, id: &str, metrics: &[&str]) -> crate::Result<ReconcileReport> {
        let summary = summary_series(&self.prefix, name);
        let mut dashboard = self.client.get_dashboard(id).await?;
        let plan = plan_widgets(&dashboard.widgets, &summary, metrics, dashboard.layout_type == "free");
        let mut report = ReconcileReport::default();

        if plan.is_unchanged() {
            log::debug!(target: LOG_TARGET, "Dashboard '{name}' is up to date");
            return Ok(report);
        }

        dashboard.widgets = plan.widgets;
        self.client.update_dashboard(id, &dashboard).await?;
        log::info!(
            target: LOG_TARGET,
            "Updated '{name}': {} widget(s) added, {} removed",
            plan.added,
            plan.removed
        );

        report.dashboards_updated = 1;
        report.widgets_added = plan.added;
        report.widgets_removed = plan.removed;
        Ok(report)
    }

    /// Copies metric descriptions into Datadog's metric metadata where they differ.
    async fn sync_descriptions(&self, name: &str, board: &Board<'_>) -> crate::Result<usize> {
        let mut updated = 0;

        for (metric, description) in &board.metrics {
            if description.is_empty() {
                continue;
            }

            let series = detail_series(&self.prefix, name, metric);
            let Some(metadata) = self.client.metric_metadata(&series).await? else {
                log::debug!(target: LOG_TARGET, "Metric '{series}' has not been reported yet, description left for later");
                continue;
            };

            if metadata.description.as_deref() == Some(*description) {
                continue;
            }

            self.client.update_metric_description(&series, description).await?;
            updated += 1;
        }

        Ok(updated)
    }
}

impl Publish for DatadogPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn publish(&self, results: &[MetricResult]) -> Result<(), PublishError> {
        let mut delivered = 0;
        let mut failed = 0;
        let mut first_error = None;

        for chunk in results.chunks(self.batch_size) {
            let series: Vec<Series> = chunk.iter().filter_map(|r| self.series(r)).flatten().collect();
            if series.is_empty() {
                continue;
            }

            match self.client.submit_series(&series).await {
                Ok(()) => delivered += chunk.len(),
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Publisher '{}' could not deliver {} result(s): {e:#}", self.name, chunk.len());
                    failed += chunk.len();
                    let _ = first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(cause) => Err(self.fail(cause).with_counts(delivered, failed)),
        }
    }

    async fn reconcile_dashboard(&self, definitions: &[MetricDefinition]) -> Result<ReconcileReport, PublishError> {
        let boards = self.boards(definitions);
        let existing = self.client.list_dashboards().await.map_err(|e| self.fail(e))?;
        let mut report = ReconcileReport::default();

        for ((name, kind), board) in &boards {
            let existing_id = existing.iter().find(|d| d.title == *name).map(|d| d.id.as_str());

            report += self
                .reconcile_board(name, *kind, board, existing_id)
                .await
                .map_err(|e| self.fail(e))?;

            report.descriptions_updated += self.sync_descriptions(name, board).await.map_err(|e| self.fail(e))?;
        }

        // managed dashboards no binding names anymore lose their metric widgets
        let orphans = existing
            .iter()
            .filter(|d| d.description.as_deref() == Some(MANAGED_DESCRIPTION))
            .filter(|d| !boards.keys().any(|(name, _)| *name == d.title));

        for orphan in orphans {
            log::debug!(target: LOG_TARGET, "Dashboard '{}' is no longer bound by any metric", orphan.title);
            report += self
                .update_board(&orphan.title, &orphan.id, &[])
                .await
                .map_err(|e| self.fail(e))?;
        }

        Ok(report)
    }
}
