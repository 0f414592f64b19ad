use crate::fetchers::{Fetch, FetchError, FetcherRegistry};
use crate::metrics::{Binding, MetricDefinition, MetricResult, MetricType, SubMetric};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

const LOG_TARGET: &str = " evaluator";

/// Why a sub-metric produced no result.
#[derive(Debug, Error)]
pub enum EvaluationErrorKind {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("fetcher '{0}' is not enabled for this run")]
    FetcherUnavailable(Arc<str>),
}

/// A sub-metric that was skipped. Never affects its siblings or other definitions.
#[derive(Debug, Error)]
#[error("metric '{metric}', sub-metric '{sub_metric}': {kind}")]
pub struct EvaluationError {
    pub metric: Arc<str>,
    pub sub_metric: Arc<str>,
    pub kind: EvaluationErrorKind,
}

/// Turns metric definitions into results using the fetchers of a run.
///
/// Holds only shared references, so one evaluator can drive many definitions concurrently.
#[derive(Debug)]
pub struct Evaluator<'a, F: Fetch> {
    fetchers: &'a FetcherRegistry<F>,
    types: &'a [MetricType],
}

impl<'a, F: Fetch> Evaluator<'a, F> {
    #[must_use]
    pub const fn new(fetchers: &'a FetcherRegistry<F>, types: &'a [MetricType]) -> Self {
        Self { fetchers, types }
    }

    /// Whether `definition` passes the type filter and has something active to evaluate.
    #[must_use]
    pub fn should_evaluate(&self, definition: &MetricDefinition) -> bool {
        self.types.contains(&definition.metric_type) && definition.is_active()
    }

    /// Evaluates every active sub-metric of `definition`, in declaration order.
    ///
    /// Returns nothing for a skipped definition. Failed sub-metrics are logged and returned as errors.
    pub async fn evaluate(&self, definition: &MetricDefinition) -> Vec<Result<MetricResult, EvaluationError>> {
        if !self.should_evaluate(definition) {
            log::debug!(target: LOG_TARGET, "Skipping '{}'", definition.name);
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(definition.sub_metrics.len());
        for sub in definition.active_sub_metrics() {
            let outcome = self.evaluate_sub_metric(definition, sub).await.map_err(|kind| EvaluationError {
                metric: Arc::clone(&definition.name),
                sub_metric: Arc::clone(&sub.key),
                kind,
            });

            match &outcome {
                Ok(result) => log::debug!(target: LOG_TARGET, "{}.{} = {}", result.metric, result.sub_metric, result.value),
                Err(e) => log::warn!(target: LOG_TARGET, "Skipped {e}"),
            }

            outcomes.push(outcome);
        }

        outcomes
    }

    async fn evaluate_sub_metric(&self, definition: &MetricDefinition, sub: &SubMetric) -> Result<MetricResult, EvaluationErrorKind> {
        let value = match definition.metric_type {
            MetricType::Quality => {
                let Some(binding) = sub.fetchers.first() else {
                    return Err(EvaluationErrorKind::FetcherUnavailable(Arc::from("<none>")));
                };
                self.fetch(binding).await?
            }

            MetricType::Consistency => {
                let [first, second] = sub.fetchers.as_slice() else {
                    return Err(EvaluationErrorKind::FetcherUnavailable(Arc::from("<none>")));
                };

                // declared order matters for both actions
                let a = self.fetch(first).await?;
                let b = self.fetch(second).await?;

                definition.action.combine(a, b).ok_or(EvaluationErrorKind::DivisionByZero)?
            }
        };

        let mut tags = sub.tags.clone();
        let _ = tags.insert("metric".to_string(), definition.name.to_string());
        let _ = tags.insert("team".to_string(), definition.team.to_string());

        Ok(MetricResult {
            metric: Arc::clone(&definition.name),
            sub_metric: Arc::clone(&sub.key),
            value,
            tags,
            timestamp: Utc::now(),
            publishers: Arc::clone(&sub.publishers),
        })
    }

    async fn fetch(&self, binding: &Binding) -> Result<f64, EvaluationErrorKind> {
        let Some(fetcher) = self.fetchers.get(&binding.name) else {
            return Err(EvaluationErrorKind::FetcherUnavailable(Arc::clone(&binding.name)));
        };

        Ok(self.fetchers.fetch_with_timeout(fetcher, &binding.params).await?)
    }
}
