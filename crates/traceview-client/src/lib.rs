use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { base_url, http })
    }

    pub async fn healthz(&self) -> Result<(), Error> {
        let url = self.base_url.join("healthz")?;
        self.http.get(url).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn trace_volume(&self) -> Result<Vec<TraceVolumePoint>, Error> {
        self.get_json("metrics/trace_volume").await
    }

    pub async fn token_usage(&self) -> Result<Vec<ModelTokenUsage>, Error> {
        self.get_json("metrics/token_usage").await
    }

    pub async fn latency_by_model(&self) -> Result<Vec<ModelLatency>, Error> {
        self.get_json("metrics/latency_by_model").await
    }

    pub async fn total_tokens(&self) -> Result<TotalTokens, Error> {
        self.get_json("metrics/total_tokens").await
    }

    pub async fn average_latency(&self) -> Result<AverageLatency, Error> {
        self.get_json("metrics/average_latency").await
    }

    pub async fn total_cost(&self) -> Result<TotalCost, Error> {
        self.get_json("metrics/total_cost").await
    }

    pub async fn success_rate(&self) -> Result<SuccessRate, Error> {
        self.get_json("metrics/success_rate").await
    }

    pub async fn list_traces(&self, project_id: &str) -> Result<Vec<TraceSummary>, Error> {
        let mut url = self.base_url.join("traces")?;
        url.query_pairs_mut().append_pair("project_id", project_id);
        let res = self.http.get(url).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn trace_details(
        &self,
        project_id: &str,
        trace_id: &str,
    ) -> Result<TraceDetailsResult, Error> {
        let mut url = self.base_url.join("traces/details")?;
        url.query_pairs_mut()
            .append_pair("project_id", project_id)
            .append_pair("trace_id", trace_id);
        let res = self.http.get(url).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.base_url.join(path)?;
        let res = self.http.get(url).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TraceVolumePoint {
    pub time: String,
    pub traces: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelTokenUsage {
    pub model: String,
    pub total: i64,
    pub prompt: i64,
    pub completion: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelLatency {
    pub model: String,
    pub avg_latency: f64,
    pub requests: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotalTokens {
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AverageLatency {
    pub average_latency: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TotalCost {
    pub total_cost: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessRate {
    pub success_rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub latency: f64,
    #[serde(default)]
    pub tokens: Option<String>,
    #[serde(default)]
    pub total_cost: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObservationDto {
    pub id: String,
    pub trace_id: String,
    #[serde(default)]
    pub parent_observation_id: Option<String>,
    #[serde(default, rename = "type")]
    pub r#type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub provided_model_name: Option<String>,
    #[serde(default)]
    pub internal_model_id: Option<String>,
    #[serde(default)]
    pub usage_details: Option<JsonValue>,
    #[serde(default)]
    pub provided_usage_details: Option<JsonValue>,
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObservationNodeDto {
    #[serde(flatten)]
    pub observation: ObservationDto,
    #[serde(default)]
    pub children: Vec<ObservationNodeDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreDto {
    pub id: String,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TraceDetailsDto {
    pub trace_id: String,
    #[serde(default)]
    pub trace_name: Option<String>,
    #[serde(default)]
    pub trace_environment: Option<String>,
    #[serde(default)]
    pub trace_input: Option<String>,
    #[serde(default)]
    pub trace_output: Option<String>,
    #[serde(default)]
    pub trace_metadata: Option<JsonValue>,
    #[serde(default)]
    pub trace_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latency_seconds: Option<f64>,
    pub total_cost: f64,
    pub total_tokens: i64,
    pub observations: Vec<ObservationDto>,
    #[serde(default)]
    pub tree: Option<ObservationNodeDto>,
    #[serde(default)]
    pub scores: Vec<ScoreDto>,
}

/// The detail endpoint answers with the composed trace or a distinct
/// "no data" payload; both arrive with HTTP 200.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceDetailsResult {
    Found(Box<TraceDetailsDto>),
    NoData { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detail_result_distinguishes_no_data_from_found() {
        let no_data: TraceDetailsResult =
            serde_json::from_value(json!({ "detail": "No observations found for this trace." }))
                .unwrap();
        assert!(matches!(no_data, TraceDetailsResult::NoData { .. }));

        let found: TraceDetailsResult = serde_json::from_value(json!({
            "trace_id": "t",
            "total_cost": 0.0015,
            "total_tokens": 900,
            "observations": [{ "id": "a", "trace_id": "t" }],
            "scores": [],
        }))
        .unwrap();
        match found {
            TraceDetailsResult::Found(details) => {
                assert_eq!(details.trace_id, "t");
                assert_eq!(details.total_tokens, 900);
            }
            TraceDetailsResult::NoData { .. } => panic!("expected found"),
        }
    }

    #[test]
    fn nested_tree_deserializes_recursively() {
        let node: ObservationNodeDto = serde_json::from_value(json!({
            "id": "root", "trace_id": "t",
            "children": [
                { "id": "child", "trace_id": "t", "parent_observation_id": "root",
                  "children": [] }
            ],
        }))
        .unwrap();
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].observation.id, "child");
    }
}
