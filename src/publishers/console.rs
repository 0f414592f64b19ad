use crate::config::PublisherConfig;
use crate::metrics::{MetricDefinition, MetricResult};
use crate::publishers::{Publish, PublishError, ReconcileReport};
use core::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

/// Prints one line per result to standard output.
///
/// Owns no dashboards, so reconciliation never changes anything.
#[derive(Debug)]
pub struct ConsolePublisher {
    name: Arc<str>,
    batch_size: usize,
}

impl ConsolePublisher {
    #[must_use]
    pub fn from_config(config: &PublisherConfig) -> Self {
        Self {
            name: Arc::from(config.name.as_str()),
            batch_size: config.batch_size,
        }
    }
}

pub(crate) fn format_result(result: &MetricResult) -> String {
    let mut line = format!(
        "{} {}.{} = {}",
        result.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
        result.metric,
        result.sub_metric,
        result.value
    );

    for (key, value) in &result.tags {
        let _ = write!(line, " {key}={value}");
    }

    line
}

impl Publish for ConsolePublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn publish(&self, results: &[MetricResult]) -> Result<(), PublishError> {
        let mut delivered = 0;
        for chunk in results.chunks(self.batch_size) {
            let text: String = chunk.iter().map(|r| format_result(r) + "\n").collect();

            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
                return Err(PublishError::new(Arc::clone(&self.name), e).with_counts(delivered, results.len() - delivered));
            }

            delivered += chunk.len();
        }

        Ok(())
    }

    async fn reconcile_dashboard(&self, _definitions: &[MetricDefinition]) -> Result<ReconcileReport, PublishError> {
        Ok(ReconcileReport::default())
    }
}
