//! Query facade over the observation store.
//!
//! A fixed set of read-only, parameterized aggregates. Caller-supplied
//! identifiers are always bound as `$n` parameters, never interpolated into
//! query text. NULL sums and counts are normalized to `0`/`0.0` at the
//! mapping edge so callers never see null numerics.
//!
//! The `observations`, `traces`, and `scores` tables are an external
//! contract this service reads but does not define or migrate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Error;
use crate::model::{Observation, Score, TraceHeader};

/// Hourly GENERATION counts over the trailing 24 hours.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TraceVolumePoint {
    pub time: String,
    pub traces: i64,
}

/// Per-model token sums, top models by total tokens.
#[derive(Debug, Serialize)]
pub struct ModelTokenUsage {
    pub model: String,
    pub total: i64,
    pub prompt: i64,
    pub completion: i64,
}

/// Per-model average latency, top models by request count.
#[derive(Debug, Serialize)]
pub struct ModelLatency {
    pub model: String,
    pub avg_latency: f64,
    pub requests: i64,
}

/// Row-joined trace summary for the trace table view.
#[derive(Debug, Serialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub name: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub bookmarked: bool,
    pub latency: f64,
    pub tokens: Option<String>,
    pub total_cost: f64,
}

#[derive(sqlx::FromRow)]
struct TraceSummaryRow {
    trace_id: String,
    name: Option<String>,
    input: Option<String>,
    output: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    bookmarked: Option<bool>,
    latency: Option<f64>,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    total_cost: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct ModelTokenUsageRow {
    model: String,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    total_tokens: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct ModelLatencyRow {
    model: String,
    avg_latency: Option<f64>,
    requests: i64,
}

/// How many models the per-model breakdowns return.
const TOP_MODELS: i64 = 5;

/// Row cap for the trace list view.
const TRACE_LIST_LIMIT: i64 = 100;

/// Handle to the observation store, constructed once at startup and
/// injected into the request path.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// GENERATION observations per hour, trailing 24h, "HH:00" labels.
    pub async fn trace_volume(&self) -> Result<Vec<TraceVolumePoint>, Error> {
        let rows = sqlx::query_as::<_, TraceVolumePoint>(
            r#"
            SELECT to_char(date_trunc('hour', event_ts), 'HH24:00') AS time,
                   count(*) AS traces
            FROM observations
            WHERE type = 'GENERATION'
              AND event_ts >= now() - interval '24 hours'
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Token sums by provided model name, top models by total tokens.
    /// `usage_details` wins over `provided_usage_details` per key.
    pub async fn token_usage(&self) -> Result<Vec<ModelTokenUsage>, Error> {
        let rows = sqlx::query_as::<_, ModelTokenUsageRow>(
            r#"
            SELECT provided_model_name AS model,
                   sum(coalesce((usage_details->>'input')::bigint,
                                (provided_usage_details->>'input')::bigint))  AS input_tokens,
                   sum(coalesce((usage_details->>'output')::bigint,
                                (provided_usage_details->>'output')::bigint)) AS output_tokens,
                   sum(coalesce((usage_details->>'total')::bigint,
                                (provided_usage_details->>'total')::bigint))  AS total_tokens
            FROM observations
            WHERE provided_model_name IS NOT NULL
            GROUP BY provided_model_name
            ORDER BY total_tokens DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(TOP_MODELS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ModelTokenUsage {
                model: r.model,
                total: r.total_tokens.unwrap_or(0),
                prompt: r.input_tokens.unwrap_or(0),
                completion: r.output_tokens.unwrap_or(0),
            })
            .collect())
    }

    /// Average GENERATION latency by model, top models by request count.
    pub async fn latency_by_model(&self) -> Result<Vec<ModelLatency>, Error> {
        let rows = sqlx::query_as::<_, ModelLatencyRow>(
            r#"
            SELECT coalesce(provided_model_name, internal_model_id, 'unknown') AS model,
                   round(avg(greatest(extract(epoch FROM end_time - start_time), 0))::numeric, 3)::float8
                       AS avg_latency,
                   count(*) AS requests
            FROM observations
            WHERE type = 'GENERATION' AND end_time IS NOT NULL
            GROUP BY 1
            ORDER BY requests DESC
            LIMIT $1
            "#,
        )
        .bind(TOP_MODELS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ModelLatency {
                model: r.model,
                avg_latency: r.avg_latency.unwrap_or(0.0),
                requests: r.requests,
            })
            .collect())
    }

    pub async fn total_tokens(&self) -> Result<i64, Error> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT sum(coalesce((usage_details->>'total')::bigint,
                                (provided_usage_details->>'total')::bigint))
            FROM observations
            WHERE type = 'GENERATION'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0))
    }

    pub async fn average_latency(&self) -> Result<f64, Error> {
        let avg: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT round(avg(greatest(extract(epoch FROM end_time - start_time), 0))::numeric, 3)::float8
            FROM observations
            WHERE type = 'GENERATION' AND end_time IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(avg.unwrap_or(0.0))
    }

    pub async fn total_cost(&self) -> Result<f64, Error> {
        let total: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT sum(total_cost)::float8 FROM observations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0.0))
    }

    /// Share of GENERATION observations with `status_message = 'success'`
    /// or `level = 'DEFAULT'`, as a percentage with two decimals.
    pub async fn success_rate(&self) -> Result<f64, Error> {
        let rate: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT round(100.0 * count(*) FILTER (WHERE status_message = 'success'
                                                     OR level = 'DEFAULT')
                         / nullif(count(*), 0), 2)::float8
            FROM observations
            WHERE type = 'GENERATION'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(rate.unwrap_or(0.0))
    }

    /// Trace rows joined with their observation aggregates, newest first.
    pub async fn list_traces(&self, project_id: &str) -> Result<Vec<TraceSummary>, Error> {
        let rows = sqlx::query_as::<_, TraceSummaryRow>(
            r#"
            SELECT t.id AS trace_id,
                   t.name,
                   t.input,
                   t.output,
                   t.timestamp,
                   t.bookmarked,
                   greatest(extract(epoch FROM max(o.end_time) - min(o.start_time)), 0)::float8
                       AS latency,
                   sum((o.usage_details->>'input')::bigint)  AS input_tokens,
                   sum((o.usage_details->>'output')::bigint) AS output_tokens,
                   sum(o.total_cost)::float8 AS total_cost
            FROM traces t
            LEFT JOIN observations o
              ON o.trace_id = t.id AND o.project_id = t.project_id
            WHERE t.project_id = $1
            GROUP BY t.id, t.name, t.input, t.output, t.timestamp, t.bookmarked
            ORDER BY t.timestamp DESC NULLS LAST
            LIMIT $2
            "#,
        )
        .bind(project_id)
        .bind(TRACE_LIST_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TraceSummary {
                trace_id: r.trace_id,
                name: r.name,
                input: r.input,
                output: r.output,
                timestamp: r.timestamp,
                bookmarked: r.bookmarked.unwrap_or(false),
                latency: r.latency.unwrap_or(0.0),
                tokens: format_token_pair(r.input_tokens, r.output_tokens),
                total_cost: r.total_cost.unwrap_or(0.0),
            })
            .collect())
    }

    /// Flat observation set for one trace, in deterministic retrieval
    /// order (root selection and sibling order depend on it).
    pub async fn trace_observations(
        &self,
        project_id: &str,
        trace_id: &str,
    ) -> Result<Vec<Observation>, Error> {
        let rows = sqlx::query_as::<_, Observation>(
            r#"
            SELECT id,
                   trace_id,
                   project_id,
                   parent_observation_id,
                   type,
                   name,
                   environment,
                   level,
                   status_message,
                   start_time,
                   end_time,
                   input,
                   output,
                   provided_model_name,
                   internal_model_id,
                   model_parameters,
                   usage_details,
                   provided_usage_details,
                   total_cost::float8 AS total_cost,
                   metadata
            FROM observations
            WHERE project_id = $1 AND trace_id = $2
            ORDER BY start_time ASC NULLS LAST, id ASC
            "#,
        )
        .bind(project_id)
        .bind(trace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn trace_header(
        &self,
        project_id: &str,
        trace_id: &str,
    ) -> Result<Option<TraceHeader>, Error> {
        let row = sqlx::query_as::<_, TraceHeader>(
            r#"
            SELECT id AS trace_id,
                   name,
                   environment,
                   input,
                   output,
                   metadata,
                   timestamp AS created_at
            FROM traces
            WHERE project_id = $1 AND id = $2
            "#,
        )
        .bind(project_id)
        .bind(trace_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn trace_scores(
        &self,
        project_id: &str,
        trace_id: &str,
    ) -> Result<Vec<Score>, Error> {
        let rows = sqlx::query_as::<_, Score>(
            r#"
            SELECT id,
                   name,
                   value::float8 AS value,
                   comment AS description,
                   created_at
            FROM scores
            WHERE project_id = $1 AND trace_id = $2
            ORDER BY created_at ASC NULLS LAST, id ASC
            "#,
        )
        .bind(project_id)
        .bind(trace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn format_token_pair(input: Option<i64>, output: Option<i64>) -> Option<String> {
    match (input, output) {
        (None, None) => None,
        (input, output) => Some(format!(
            "{} → {}",
            input.unwrap_or(0),
            output.unwrap_or(0)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_pair_formats_like_the_dashboard() {
        assert_eq!(format_token_pair(Some(752), Some(38)).unwrap(), "752 → 38");
        assert_eq!(format_token_pair(Some(10), None).unwrap(), "10 → 0");
        assert_eq!(format_token_pair(None, None), None);
    }
}
