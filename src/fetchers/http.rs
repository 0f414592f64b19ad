use crate::config::{ConfigError, FetcherConfig, Params};
use crate::fetchers::{Fetch, FetchError, parse_scalar};
use core::time::Duration;
use ohno::{IntoAppError, app_err, bail};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "      http";

/// Calls a JSON HTTP endpoint and extracts one number from the response body.
#[derive(Debug)]
pub struct HttpFetcher {
    name: Arc<str>,
    client: reqwest::Client,
    base_url: Url,
}

impl HttpFetcher {
    pub fn from_config(config: &FetcherConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let entry = format!("Fetchers.{}", config.name);
        let base_url = config.param("baseUrl").ok_or_else(|| ConfigError::missing(&entry, "baseUrl"))?;
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::invalid_value(&entry, "baseUrl", e.to_string()))?;

        let mut builder = reqwest::Client::builder().user_agent("bigeye").timeout(timeout);

        if let Some(token) = config.param("token") {
            let mut auth_val = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ConfigError::invalid_value(&entry, "token", e.to_string()))?;
            auth_val.set_sensitive(true);

            let mut headers = HeaderMap::new();
            let _ = headers.insert(AUTHORIZATION, auth_val);
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|e| ConfigError::invalid(&entry, format!("unable to create HTTP client: {e}")))?;

        Ok(Self {
            name: Arc::from(config.name.as_str()),
            client,
            base_url,
        })
    }

    async fn get_value(&self, path: &str, pointer: &str) -> crate::Result<f64> {
        let url = self
            .base_url
            .join(path)
            .into_app_err_with(|| format!("invalid request path '{path}'"))?;

        log::debug!(target: LOG_TARGET, "Fetcher '{}' requesting {url}", self.name);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .into_app_err_with(|| format!("request to {url} failed"))?;

        if !response.status().is_success() {
            bail!("request to {url} failed: HTTP {}", response.status());
        }

        let body: Value = response.json().await.into_app_err("response is not valid JSON")?;
        let selected = body
            .pointer(pointer)
            .ok_or_else(|| app_err!("JSON pointer '{pointer}' does not match the response"))?;

        json_number(selected)
    }
}

fn json_number(value: &Value) -> crate::Result<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| app_err!("number {n} does not fit a 64-bit float")),
        Value::String(s) => parse_scalar(s),
        Value::Bool(b) => Ok(f64::from(u8::from(*b))),
        other => Err(app_err!("expected a number, found {other}")),
    }
}

impl Fetch for HttpFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, params: &Params) -> Result<f64, FetchError> {
        let Some(path) = params.get("path") else {
            return Err(FetchError::new(Arc::clone(&self.name), app_err!("binding has no 'path' parameter")));
        };

        let pointer = params.get("jsonPointer").map_or("", String::as_str);

        self.get_value(path, pointer)
            .await
            .map_err(|cause| FetchError::new(Arc::clone(&self.name), cause))
    }
}
