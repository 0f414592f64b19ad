//! Minimal Datadog API client
//!
//! Covers the series intake, the dashboard endpoints and metric metadata.

use core::time::Duration;
use ohno::{IntoAppError, bail};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

const LOG_TARGET: &str = "   datadog";

/// One gauge series as accepted by `POST /api/v1/series`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Series {
    pub metric: String,
    pub points: Vec<(i64, f64)>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SeriesPayload<'a> {
    series: &'a [Series],
}

#[derive(Debug, Deserialize)]
struct DashboardList {
    #[serde(default)]
    dashboards: Vec<DashboardSummary>,
}

/// An entry of the dashboard list.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A full dashboard; widgets are kept as raw JSON so unknown widget fields survive an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub layout_type: String,
    #[serde(default)]
    pub widgets: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_variables: Vec<Value>,
}

/// The part of a metric's metadata this client cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricMetadata {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
struct MetricMetadataUpdate<'a> {
    description: &'a str,
}

#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: Url,
}

impl Client {
    pub fn new(base_url: &str, api_key: &str, app_key: &str, timeout: Duration) -> crate::Result<Self> {
        let base_url = Url::parse(base_url).into_app_err_with(|| format!("invalid Datadog API URL '{base_url}'"))?;

        let mut api_key = HeaderValue::from_str(api_key).into_app_err("invalid Datadog API key")?;
        api_key.set_sensitive(true);

        let mut app_key = HeaderValue::from_str(app_key).into_app_err("invalid Datadog application key")?;
        app_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        let _ = headers.insert("dd-api-key", api_key);
        let _ = headers.insert("dd-application-key", app_key);

        let client = reqwest::Client::builder()
            .user_agent("bigeye")
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .into_app_err("unable to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> crate::Result<Url> {
        self.base_url.join(path).into_app_err_with(|| format!("invalid API path '{path}'"))
    }

    pub async fn submit_series(&self, series: &[Series]) -> crate::Result<()> {
        let url = self.url("api/v1/series")?;
        log::debug!(target: LOG_TARGET, "Submitting {} series", series.len());

        let response = self
            .client
            .post(url)
            .json(&SeriesPayload { series })
            .send()
            .await
            .into_app_err("unable to submit series")?;

        let _ = check(response, "submitting series").await?;
        Ok(())
    }

    pub async fn list_dashboards(&self) -> crate::Result<Vec<DashboardSummary>> {
        let url = self.url("api/v1/dashboard")?;
        let response = self.client.get(url).send().await.into_app_err("unable to list dashboards")?;
        let list: DashboardList = check(response, "listing dashboards")
            .await?
            .json()
            .await
            .into_app_err("unable to parse the dashboard list")?;

        Ok(list.dashboards)
    }

    pub async fn get_dashboard(&self, id: &str) -> crate::Result<Dashboard> {
        let url = self.url(&format!("api/v1/dashboard/{id}"))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .into_app_err_with(|| format!("unable to fetch dashboard {id}"))?;

        check(response, "fetching a dashboard")
            .await?
            .json()
            .await
            .into_app_err_with(|| format!("unable to parse dashboard {id}"))
    }

    /// Creates a dashboard and returns its identifier.
    pub async fn create_dashboard(&self, dashboard: &Dashboard) -> crate::Result<String> {
        let url = self.url("api/v1/dashboard")?;
        log::debug!(target: LOG_TARGET, "Creating dashboard '{}'", dashboard.title);

        let response = self
            .client
            .post(url)
            .json(dashboard)
            .send()
            .await
            .into_app_err_with(|| format!("unable to create dashboard '{}'", dashboard.title))?;

        let created: Dashboard = check(response, "creating a dashboard")
            .await?
            .json()
            .await
            .into_app_err("unable to parse the created dashboard")?;

        Ok(created.id.unwrap_or_default())
    }

    pub async fn update_dashboard(&self, id: &str, dashboard: &Dashboard) -> crate::Result<()> {
        let url = self.url(&format!("api/v1/dashboard/{id}"))?;
        log::debug!(target: LOG_TARGET, "Updating dashboard '{}' ({id})", dashboard.title);

        let response = self
            .client
            .put(url)
            .json(dashboard)
            .send()
            .await
            .into_app_err_with(|| format!("unable to update dashboard '{}'", dashboard.title))?;

        let _ = check(response, "updating a dashboard").await?;
        Ok(())
    }

    /// Reads a metric's metadata; `None` when the metric is unknown to Datadog.
    pub async fn metric_metadata(&self, metric: &str) -> crate::Result<Option<MetricMetadata>> {
        let url = self.url(&format!("api/v1/metrics/{metric}"))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .into_app_err_with(|| format!("unable to fetch metadata of '{metric}'"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let metadata = check(response, "fetching metric metadata")
            .await?
            .json()
            .await
            .into_app_err_with(|| format!("unable to parse metadata of '{metric}'"))?;

        Ok(Some(metadata))
    }

    pub async fn update_metric_description(&self, metric: &str, description: &str) -> crate::Result<()> {
        let url = self.url(&format!("api/v1/metrics/{metric}"))?;
        log::debug!(target: LOG_TARGET, "Updating description of '{metric}'");

        let response = self
            .client
            .put(url)
            .json(&MetricMetadataUpdate { description })
            .send()
            .await
            .into_app_err_with(|| format!("unable to update metadata of '{metric}'"))?;

        let _ = check(response, "updating metric metadata").await?;
        Ok(())
    }
}

async fn check(response: Response, what: &str) -> crate::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    bail!("{what} failed: HTTP {status}: {}", body.trim());
}
