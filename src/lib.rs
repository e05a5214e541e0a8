//! traceview: read-only observability API.
//!
//! Serves dashboard metrics computed by fixed SQL aggregates over an
//! append-only observation store, and reconstructs single traces as nested
//! observation trees with derived cost/token/latency aggregates.

pub mod aggregate;
pub mod api;
pub mod error;
pub mod model;
pub mod normalize;
pub mod rate_limit;
pub mod store;
pub mod tree;

use std::net::SocketAddr;

use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::Error;

use api::AppState;
use rate_limit::RateLimitState;
use store::Store;

pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub default_project_id: String,
    /// Comma-separated allowed origins; `*` allows any.
    pub cors_origins: String,
    pub rate_limit_qps: u32,
    pub rate_limit_burst: u32,
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let store = Store::connect(&config.database_url).await?;
    let state = AppState {
        store,
        default_project_id: config.default_project_id,
    };
    let limiter = RateLimitState::new(config.rate_limit_qps, config.rate_limit_burst);

    let app = router(state)
        .layer(middleware::from_fn_with_state(limiter, rate_limit::limit))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "traceview listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/metrics/trace_volume", get(api::trace_volume))
        .route("/metrics/token_usage", get(api::token_usage))
        .route("/metrics/latency_by_model", get(api::latency_by_model))
        .route("/metrics/total_tokens", get(api::total_tokens))
        .route("/metrics/average_latency", get(api::average_latency))
        .route("/metrics/total_cost", get(api::total_cost))
        .route("/metrics/success_rate", get(api::success_rate))
        .route("/traces", get(api::list_traces))
        .route("/traces/details", get(api::trace_details))
        .with_state(state)
}

fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if origins.split(',').any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
