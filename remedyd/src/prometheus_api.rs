//! Oracle backed by the Prometheus HTTP API (`/api/v1/query`).

use crate::credentials::Credentials;
use chrono::{DateTime, Utc};
use remedy_common::{Oracle, OracleError, Sample};
use reqwest::Url;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    data: Option<QueryData>,
    error_type: Option<String>,
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    metric: BTreeMap<String, String>,
    /// `[<unix time>, "<value>"]`
    value: (serde_json::Value, String),
}

/// Instant-query client for one Prometheus server.
#[derive(Debug, Clone)]
pub struct PrometheusOracle {
    client: reqwest::Client,
    query_url: Url,
    credentials: Option<Credentials>,
}

impl PrometheusOracle {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self, OracleError> {
        let query_url = Url::parse(&format!("{}/api/v1/query", base_url.trim_end_matches('/')))
            .map_err(|e| OracleError::Transport(format!("invalid Prometheus URL {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            query_url,
            credentials,
        })
    }

    fn request_url(&self, query: &str, at: DateTime<Utc>) -> Url {
        let mut url = self.query_url.clone();
        let time = format!("{:.3}", at.timestamp_millis() as f64 / 1000.0);
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("time", &time);
        url
    }
}

impl Oracle for PrometheusOracle {
    async fn evaluate(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>, OracleError> {
        let mut request = self.client.get(self.request_url(query, at));
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(creds.password()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let parsed: ApiResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(OracleError::Transport(format!("Prometheus returned HTTP {status}")));
            }
            Err(e) => return Err(OracleError::MalformedResponse(e.to_string())),
        };

        decode_response(parsed, query)
    }
}

fn decode_response(response: ApiResponse, query: &str) -> Result<Vec<Sample>, OracleError> {
    for warning in &response.warnings {
        warn!(query, "Prometheus warning: {}", warning);
    }

    match response.status.as_str() {
        "success" => {}
        "error" => {
            return Err(OracleError::Query {
                error_type: response.error_type.unwrap_or_default(),
                message: response.error.unwrap_or_default(),
            });
        }
        other => {
            return Err(OracleError::MalformedResponse(format!("unknown status '{other}'")));
        }
    }

    let data = response
        .data
        .ok_or_else(|| OracleError::MalformedResponse("missing data".to_string()))?;
    if data.result_type != "vector" {
        return Err(OracleError::MalformedResponse(format!(
            "expected a vector result, got '{}'",
            data.result_type
        )));
    }

    let raw: Vec<VectorSample> = serde_json::from_value(data.result)
        .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

    let samples = raw
        .into_iter()
        .map(|s| {
            let value = s.value.1.parse::<f64>().map_err(|_| {
                OracleError::MalformedResponse(format!("non-numeric sample value '{}'", s.value.1))
            })?;
            Ok(Sample {
                labels: s.metric,
                value,
            })
        })
        .collect::<Result<Vec<_>, OracleError>>()?;

    debug!(query, samples = samples.len(), "Evaluated query");
    Ok(samples)
}
