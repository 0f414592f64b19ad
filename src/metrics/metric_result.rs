use crate::metrics::Binding;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The value of one sub-metric, ready to be published.
///
/// The publisher bindings of the sub-metric travel with the result so each publisher can derive
/// its series names from its own binding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub metric: Arc<str>,
    pub sub_metric: Arc<str>,
    pub value: f64,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub publishers: Arc<[Binding]>,
}

impl MetricResult {
    #[must_use]
    pub fn publisher_binding(&self, publisher: &str) -> Option<&Binding> {
        self.publishers.iter().find(|b| &*b.name == publisher)
    }

    #[must_use]
    pub fn is_bound_to(&self, publisher: &str) -> bool {
        self.publisher_binding(publisher).is_some()
    }

    /// Tags rendered as `key:value` strings.
    pub fn tag_pairs(&self) -> impl Iterator<Item = String> + '_ {
        self.tags.iter().map(|(k, v)| format!("{k}:{v}"))
    }
}
