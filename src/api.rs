//! HTTP handlers and response records for the read surface.
//!
//! Metric endpoints are thin pass-throughs over the query facade. The
//! trace-detail endpoint is the composition point: fetched rows flow
//! through the normalizer, tree builder, and aggregator into one response
//! object.

use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::aggregate;
use crate::error::Error;
use crate::model::{Observation, Score, TraceHeader};
use crate::store::{ModelLatency, ModelTokenUsage, Store, TraceSummary, TraceVolumePoint};
use crate::tree::{self, ObservationNode};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub default_project_id: String,
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn trace_volume(
    State(state): State<AppState>,
) -> Result<Json<Vec<TraceVolumePoint>>, Error> {
    Ok(Json(state.store.trace_volume().await?))
}

pub async fn token_usage(
    State(state): State<AppState>,
) -> Result<Json<Vec<ModelTokenUsage>>, Error> {
    Ok(Json(state.store.token_usage().await?))
}

pub async fn latency_by_model(
    State(state): State<AppState>,
) -> Result<Json<Vec<ModelLatency>>, Error> {
    Ok(Json(state.store.latency_by_model().await?))
}

#[derive(Debug, Serialize)]
pub struct TotalTokens {
    pub total_tokens: i64,
}

pub async fn total_tokens(State(state): State<AppState>) -> Result<Json<TotalTokens>, Error> {
    Ok(Json(TotalTokens {
        total_tokens: state.store.total_tokens().await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct AverageLatency {
    pub average_latency: f64,
}

pub async fn average_latency(
    State(state): State<AppState>,
) -> Result<Json<AverageLatency>, Error> {
    Ok(Json(AverageLatency {
        average_latency: state.store.average_latency().await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct TotalCost {
    pub total_cost: f64,
}

pub async fn total_cost(State(state): State<AppState>) -> Result<Json<TotalCost>, Error> {
    Ok(Json(TotalCost {
        total_cost: state.store.total_cost().await?,
    }))
}

#[derive(Debug, Serialize)]
pub struct SuccessRate {
    pub success_rate: f64,
}

pub async fn success_rate(State(state): State<AppState>) -> Result<Json<SuccessRate>, Error> {
    Ok(Json(SuccessRate {
        success_rate: state.store.success_rate().await?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListTracesQuery {
    pub project_id: Option<String>,
}

pub async fn list_traces(
    State(state): State<AppState>,
    Query(query): Query<ListTracesQuery>,
) -> Result<Json<Vec<TraceSummary>>, Error> {
    let project_id = query
        .project_id
        .unwrap_or_else(|| state.default_project_id.clone());
    Ok(Json(state.store.list_traces(&project_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TraceDetailsQuery {
    pub project_id: Option<String>,
    pub trace_id: String,
}

/// Composed response for one trace: trace-level fields, derived aggregates,
/// the flat observation list (orphans included), and the reconstructed tree
/// (orphans excluded).
#[derive(Debug, Serialize)]
pub struct TraceDetails {
    pub trace_id: String,
    pub trace_name: Option<String>,
    pub trace_environment: Option<String>,
    pub trace_input: Option<String>,
    pub trace_output: Option<String>,
    pub trace_metadata: Option<JsonValue>,
    pub trace_created_at: Option<DateTime<Utc>>,
    pub latency_seconds: Option<f64>,
    pub total_cost: f64,
    pub total_tokens: i64,
    pub observations: Vec<Observation>,
    pub tree: Option<ObservationNode>,
    pub scores: Vec<Score>,
}

impl TraceDetails {
    /// Assemble the detail response from fetched rows. Pure; callers handle
    /// the empty-set case before this point.
    pub fn compose(
        trace_id: String,
        header: Option<TraceHeader>,
        observations: Vec<Observation>,
        scores: Vec<Score>,
    ) -> Self {
        let summary = aggregate::aggregate(&observations);
        let built = tree::build(&observations);

        // trace-level fields prefer the traces row, falling back to the
        // root observation when the row is missing or sparse
        let root = built.as_ref().map(|t| &t.root.observation);
        let (h_name, h_env, h_input, h_output, h_meta, h_created) = match header {
            Some(h) => (h.name, h.environment, h.input, h.output, h.metadata, h.created_at),
            None => (None, None, None, None, None, None),
        };

        Self {
            trace_id,
            trace_name: h_name.or_else(|| root.and_then(|r| r.name.clone())),
            trace_environment: h_env.or_else(|| root.and_then(|r| r.environment.clone())),
            trace_input: h_input.or_else(|| root.and_then(|r| r.input.clone())),
            trace_output: h_output.or_else(|| root.and_then(|r| r.output.clone())),
            trace_metadata: h_meta.or_else(|| root.and_then(|r| r.metadata.clone())),
            trace_created_at: h_created.or_else(|| root.and_then(|r| r.start_time)),
            latency_seconds: summary.latency_seconds,
            total_cost: summary.total_cost,
            total_tokens: summary.total_tokens,
            observations,
            tree: built.map(|t| t.root),
            scores,
        }
    }
}

/// Either the composed details or the distinct "no data" payload. An empty
/// observation set is not an error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TraceDetailsResponse {
    Found(Box<TraceDetails>),
    NoData { detail: String },
}

impl TraceDetailsResponse {
    pub fn no_data() -> Self {
        Self::NoData {
            detail: "No observations found for this trace.".to_string(),
        }
    }
}

pub async fn trace_details(
    State(state): State<AppState>,
    Query(query): Query<TraceDetailsQuery>,
) -> Result<Json<TraceDetailsResponse>, Error> {
    let project_id = query
        .project_id
        .unwrap_or_else(|| state.default_project_id.clone());

    let observations = state
        .store
        .trace_observations(&project_id, &query.trace_id)
        .await?;
    if observations.is_empty() {
        return Ok(Json(TraceDetailsResponse::no_data()));
    }

    let header = state
        .store
        .trace_header(&project_id, &query.trace_id)
        .await?;
    let scores = state
        .store
        .trace_scores(&project_id, &query.trace_id)
        .await?;

    Ok(Json(TraceDetailsResponse::Found(Box::new(
        TraceDetails::compose(query.trace_id, header, observations, scores),
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(value: serde_json::Value) -> Observation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn no_data_payload_matches_the_contract() {
        let body = serde_json::to_value(TraceDetailsResponse::no_data()).unwrap();
        assert_eq!(
            body,
            json!({ "detail": "No observations found for this trace." })
        );
    }

    #[test]
    fn compose_fills_trace_fields_from_root_when_header_is_missing() {
        let observations = vec![obs(json!({
            "id": "root", "trace_id": "t",
            "name": "QA-Chatbot",
            "environment": "production",
            "start_time": "2023-10-26T10:23:45.000Z",
            "end_time": "2023-10-26T10:23:46.200Z",
        }))];
        let details = TraceDetails::compose("t".into(), None, observations, Vec::new());
        assert_eq!(details.trace_name.as_deref(), Some("QA-Chatbot"));
        assert_eq!(details.trace_environment.as_deref(), Some("production"));
        assert_eq!(details.trace_created_at, details.observations[0].start_time);
        assert!((details.latency_seconds.unwrap() - 1.2).abs() < 1e-6);
    }

    #[test]
    fn compose_keeps_orphans_in_flat_list_but_out_of_tree() {
        let observations = vec![
            obs(json!({"id": "a", "trace_id": "t", "total_cost": 1.0})),
            obs(json!({
                "id": "lost", "trace_id": "t",
                "parent_observation_id": "nowhere",
                "total_cost": 2.0,
            })),
        ];
        let details = TraceDetails::compose("t".into(), None, observations, Vec::new());
        assert_eq!(details.observations.len(), 2);
        let tree = details.tree.unwrap();
        assert!(tree.children.is_empty());
        // the orphan still contributes to flat aggregates
        assert!((details.total_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn detail_serialization_uses_dashboard_field_names() {
        let observations = vec![obs(json!({"id": "a", "trace_id": "t"}))];
        let details = TraceDetails::compose("t".into(), None, observations, Vec::new());
        let body = serde_json::to_value(TraceDetailsResponse::Found(Box::new(details))).unwrap();
        for key in [
            "trace_id",
            "trace_name",
            "latency_seconds",
            "total_cost",
            "total_tokens",
            "observations",
            "scores",
        ] {
            assert!(body.get(key).is_some(), "missing key {key}");
        }
    }
}
