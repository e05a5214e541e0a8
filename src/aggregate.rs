//! Trace-level aggregates over a flat observation set.
//!
//! Sums degrade per-field: an observation with an unusable cost or usage
//! mapping contributes zero for that field and stays in every other
//! computation. This module never errors.

use serde::Serialize;

use crate::model::Observation;
use crate::normalize;
use crate::tree;

/// Derived totals for one trace.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TraceAggregate {
    pub total_cost: f64,
    pub total_tokens: i64,
    /// Root observation `end_time - start_time`, clamped to zero. Absent
    /// when either root timestamp is unavailable.
    pub latency_seconds: Option<f64>,
}

/// Compute cost, token, and latency aggregates for one trace's
/// observations, in retrieval order.
pub fn aggregate(observations: &[Observation]) -> TraceAggregate {
    let mut total_cost = 0.0;
    let mut total_tokens = 0;

    for obs in observations {
        total_cost += obs.total_cost.unwrap_or(0.0);
        // token totals read usage_details["total"] only; the provided_
        // variant feeds the SQL aggregates, not this sum
        total_tokens += obs
            .usage_details
            .as_ref()
            .filter(|u| u.is_object())
            .and_then(|u| u.get("total"))
            .and_then(normalize::integer)
            .unwrap_or(0);
    }

    TraceAggregate {
        total_cost,
        total_tokens,
        latency_seconds: tree::root(observations).and_then(root_latency),
    }
}

fn root_latency(root: &Observation) -> Option<f64> {
    let start = root.start_time?;
    let end = root.end_time?;
    let elapsed = end.signed_duration_since(start);
    let seconds = match elapsed.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => elapsed.num_milliseconds() as f64 / 1e3,
    };
    Some(seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(value: serde_json::Value) -> Observation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn sums_costs_and_tokens_across_observations() {
        let observations = vec![
            obs(json!({
                "id": "a", "trace_id": "t",
                "total_cost": 0.001,
                "usage_details": {"input": 752, "output": 38, "total": 790},
            })),
            obs(json!({
                "id": "b", "trace_id": "t", "parent_observation_id": "a",
                "total_cost": 0.0005,
                "usage_details": {"total": 110},
            })),
        ];
        let agg = aggregate(&observations);
        assert!((agg.total_cost - 0.0015).abs() < 1e-9);
        assert_eq!(agg.total_tokens, 900);
    }

    #[test]
    fn malformed_fields_contribute_zero_without_skipping_the_row() {
        let observations = vec![
            obs(json!({
                "id": "a", "trace_id": "t",
                "total_cost": "not money",
                "usage_details": {"total": 100},
            })),
            obs(json!({
                "id": "b", "trace_id": "t", "parent_observation_id": "a",
                "total_cost": 2.0,
                "usage_details": "not a mapping",
            })),
            obs(json!({
                "id": "c", "trace_id": "t", "parent_observation_id": "a",
                "total_cost": 3.0,
            })),
        ];
        let agg = aggregate(&observations);
        // "a" still counts tokens, "b" still counts cost
        assert!((agg.total_cost - 5.0).abs() < 1e-9);
        assert_eq!(agg.total_tokens, 100);
    }

    #[test]
    fn usage_total_tolerates_non_numeric_values() {
        let observations = vec![obs(json!({
            "id": "a", "trace_id": "t",
            "usage_details": {"total": "many"},
        }))];
        assert_eq!(aggregate(&observations).total_tokens, 0);
    }

    #[test]
    fn latency_comes_from_root_timestamps_only() {
        let observations = vec![
            obs(json!({
                "id": "root", "trace_id": "t",
                "start_time": "2023-10-26T10:23:45.000Z",
                "end_time": "2023-10-26T10:23:46.200Z",
            })),
            obs(json!({
                "id": "child", "trace_id": "t", "parent_observation_id": "root",
                "start_time": "2023-10-26T10:23:45.000Z",
                "end_time": "2023-10-26T10:23:55.000Z",
            })),
        ];
        let agg = aggregate(&observations);
        assert!((agg.latency_seconds.unwrap() - 1.2).abs() < 1e-6);
    }

    #[test]
    fn latency_absent_when_root_timestamps_are_unavailable() {
        let observations = vec![obs(json!({
            "id": "root", "trace_id": "t",
            "start_time": "2023-10-26T10:23:45.000Z",
        }))];
        assert_eq!(aggregate(&observations).latency_seconds, None);

        let malformed = vec![obs(json!({
            "id": "root", "trace_id": "t",
            "start_time": "garbage",
            "end_time": "2023-10-26T10:23:46.000Z",
        }))];
        assert_eq!(aggregate(&malformed).latency_seconds, None);
    }

    #[test]
    fn inverted_timestamps_clamp_to_zero() {
        let observations = vec![obs(json!({
            "id": "root", "trace_id": "t",
            "start_time": "2023-10-26T10:23:46.000Z",
            "end_time": "2023-10-26T10:23:45.000Z",
        }))];
        assert_eq!(aggregate(&observations).latency_seconds, Some(0.0));
    }

    #[test]
    fn empty_set_aggregates_to_zero() {
        let agg = aggregate(&[]);
        assert_eq!(agg.total_cost, 0.0);
        assert_eq!(agg.total_tokens, 0);
        assert_eq!(agg.latency_seconds, None);
    }
}
