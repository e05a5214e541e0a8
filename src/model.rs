//! Typed projections of observation store rows.
//!
//! Every optional column is declared as an `Option` field; the lenient
//! serde adapters in [`crate::normalize`] make deserialization total, so a
//! malformed timestamp or cost in a JSON payload degrades to absence
//! instead of failing the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::normalize;

/// One timed unit of work (span, generation call, or event) within a trace.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Observation {
    pub id: String,
    pub trace_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub parent_observation_id: Option<String>,

    #[serde(default, rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,

    #[serde(default, deserialize_with = "normalize::lenient_instant")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "normalize::lenient_instant")]
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
    pub model_parameters: Option<JsonValue>,

    #[serde(default)]
    pub usage_details: Option<JsonValue>,
    #[serde(default)]
    pub provided_usage_details: Option<JsonValue>,
    #[serde(default, deserialize_with = "normalize::lenient_money")]
    pub total_cost: Option<f64>,

    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

impl Observation {
    /// Whether the parent pointer designates this observation as a root
    /// candidate. Both a missing and an empty parent id qualify.
    pub fn is_root_candidate(&self) -> bool {
        self.parent_observation_id
            .as_deref()
            .map_or(true, str::is_empty)
    }
}

/// Evaluation score attached to a trace.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Score {
    pub id: String,
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Trace-level row, when the `traces` table has one for the requested id.
///
/// Observations can outlive a missing trace row under eventually-consistent
/// ingestion, so callers must treat this as optional and fall back to the
/// root observation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TraceHeader {
    pub trace_id: String,
    pub name: Option<String>,
    pub environment: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: Option<DateTime<Utc>>,
}
