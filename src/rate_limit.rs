//! Per-client rate limiting.
//!
//! One GCRA limiter per client IP, created lazily. Proxied requests are
//! keyed by the first `X-Forwarded-For` entry when it parses as an
//! address, otherwise by the socket peer.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct RateLimitState {
    limiters: Arc<DashMap<IpAddr, Arc<DirectLimiter>>>,
    quota: Quota,
}

impl RateLimitState {
    pub fn new(qps: u32, burst: u32) -> Self {
        let qps = NonZeroU32::new(qps).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst.max(qps.get())).unwrap_or(qps);
        Self {
            limiters: Arc::new(DashMap::new()),
            quota: Quota::per_second(qps).allow_burst(burst),
        }
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<DirectLimiter> {
        self.limiters
            .entry(ip)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone()
    }
}

pub async fn limit(
    State(state): State<RateLimitState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request, addr);
    if state.limiter_for(ip).check().is_err() {
        tracing::debug!(%ip, "rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }
    next.run(request).await
}

fn client_ip(request: &Request, addr: SocketAddr) -> IpAddr {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_never_undercuts_qps() {
        // construction must not panic for degenerate env values
        let _ = RateLimitState::new(0, 0);
        let _ = RateLimitState::new(20, 5);
    }

    #[test]
    fn forwarded_for_prefers_first_parsable_entry() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        let fallback: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(
            client_ip(&request, fallback),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn socket_peer_is_the_fallback_key() {
        let request = Request::builder()
            .header("x-forwarded-for", "not-an-address")
            .body(axum::body::Body::empty())
            .unwrap();
        let fallback: SocketAddr = "192.0.2.4:1234".parse().unwrap();
        assert_eq!(
            client_ip(&request, fallback),
            "192.0.2.4".parse::<IpAddr>().unwrap()
        );
    }
}
