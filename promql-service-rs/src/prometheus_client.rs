// promql-service-rs/src/prometheus_client.rs
//
// Client for the internal Prometheus connector API.
//
// Configuration (.env file):
// - PROMETHEUS_CONNECTOR_URL: base URL of the connector (required)
// - PROMETHEUS_TIMEOUT_SECS: request timeout in seconds (default 10)
//
// Single attempt per invocation, no retry: the pipeline owns failure policy
// and records the outcome either way. Every failure - transport, timeout or
// non-2xx status - collapses into one kind; callers never have to tell them
// apart.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum PrometheusError {
    #[error("failed to fetch data from Prometheus connector: {0}")]
    Unavailable(String),

    #[error("PROMETHEUS_CONNECTOR_URL is not set")]
    MissingBaseUrl,
}

/// Boundary to the metrics backend. Takes the execution payload, returns the
/// connector's response JSON opaquely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsExecutor: Send + Sync {
    /// POST the execution payload to the connector, injecting
    /// `conversationId` when an identifier exists so the backend can
    /// correlate.
    async fn fetch_prometheus_data(
        &self,
        payload: Map<String, Value>,
        conversation_id: Option<String>,
    ) -> Result<Value, PrometheusError>;
}

#[derive(Debug)]
pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, base_url }
    }

    pub fn from_env() -> Result<Self, PrometheusError> {
        let base_url = std::env::var("PROMETHEUS_CONNECTOR_URL")
            .map_err(|_| PrometheusError::MissingBaseUrl)?;
        if base_url.is_empty() {
            return Err(PrometheusError::MissingBaseUrl);
        }
        let timeout_secs = config_rs::env_parse("PROMETHEUS_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        Ok(Self::new(base_url, Duration::from_secs(timeout_secs)))
    }

    fn endpoint(&self) -> String {
        format!("{}/prometheusData", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl MetricsExecutor for PrometheusClient {
    async fn fetch_prometheus_data(
        &self,
        mut payload: Map<String, Value>,
        conversation_id: Option<String>,
    ) -> Result<Value, PrometheusError> {
        if let Some(id) = conversation_id {
            payload.insert("conversationId".to_string(), Value::String(id));
        }

        let response = self
            .client
            .post(self.endpoint())
            .json(&Value::Object(payload))
            .send()
            .await
            .map_err(|err| PrometheusError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PrometheusError::Unavailable(format!(
                "connector returned {}: {}",
                status, body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| PrometheusError::Unavailable(err.to_string()))
    }
}
