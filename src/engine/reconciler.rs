use crate::engine::RunContext;
use crate::fetchers::Fetch;
use crate::metrics::MetricDefinition;
use crate::publishers::{Publish, ReconcileReport};

const LOG_TARGET: &str = "reconciler";

/// Outcome of reconciling the dashboards of every live publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardsSummary {
    /// Publishers whose dashboards were reconciled
    pub publishers: usize,

    /// Publishers whose reconciliation failed
    pub failed: usize,

    /// Combined changes of the successful reconciliations
    pub report: ReconcileReport,
}

impl BoardsSummary {
    #[must_use]
    pub const fn all_failed(&self) -> bool {
        self.publishers > 0 && self.failed == self.publishers
    }
}

/// Calls `reconcile_dashboard` once per live publisher with the definitions bound to it.
///
/// Publishers no definition is bound to are still called, with no definitions, so dashboards they
/// manage lose their stale widgets. A failure is reported for its publisher only.
pub async fn reconcile_boards<F: Fetch, P: Publish>(context: &RunContext<F, P>, definitions: &[MetricDefinition]) -> BoardsSummary {
    let mut summary = BoardsSummary::default();

    for slot in context.publishers().iter() {
        let bound: Vec<MetricDefinition> = definitions
            .iter()
            .filter(|d| d.binds_publisher(slot.name()))
            .cloned()
            .collect();

        if bound.is_empty() {
            log::debug!(target: LOG_TARGET, "No definition is bound to publisher '{}', pruning its dashboards", slot.name());
        }

        summary.publishers += 1;
        log::info!(target: LOG_TARGET, "Reconciling dashboards of '{}' for {} metric(s)", slot.name(), bound.len());

        match slot.reconcile_dashboard(&bound).await {
            Ok(report) => {
                log::info!(
                    target: LOG_TARGET,
                    "Publisher '{}': {} dashboard(s) created, {} updated, {} widget(s) added, {} removed, {} description(s) updated",
                    slot.name(),
                    report.dashboards_created,
                    report.dashboards_updated,
                    report.widgets_added,
                    report.widgets_removed,
                    report.descriptions_updated
                );
                summary.report += report;
            }
            Err(e) => {
                summary.failed += 1;
                log::warn!(target: LOG_TARGET, "Reconciliation failed: {e}");
            }
        }
    }

    summary
}
