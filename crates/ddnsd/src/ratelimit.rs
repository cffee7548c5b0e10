//! Per-client cool-down
//!
//! A client (by IP) may send one request per cool-down window; anything
//! sooner is answered with 429 before routing. The limiter knows nothing
//! about accounts or payloads.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ddns_core::Ack;

/// Above this many tracked clients, expired entries are dropped
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    trust_proxy_headers: bool,
    last_seen: Mutex<HashMap<IpAddr, Instant>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration, trust_proxy_headers: bool) -> Self {
        Self {
            cooldown,
            trust_proxy_headers,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request from `client` at `now`
    ///
    /// Returns false when the client is still cooling down. A rejected
    /// request does not extend the window.
    pub fn check(&self, client: IpAddr, now: Instant) -> bool {
        let mut last_seen = match self.last_seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(seen) = last_seen.get(&client)
            && now.saturating_duration_since(*seen) < self.cooldown
        {
            return false;
        }

        if last_seen.len() >= PRUNE_THRESHOLD {
            let cooldown = self.cooldown;
            last_seen.retain(|_, seen| now.saturating_duration_since(*seen) < cooldown);
        }
        last_seen.insert(client, now);
        true
    }

    /// Number of clients currently tracked
    pub fn tracked(&self) -> usize {
        match self.last_seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}

/// Address the request is attributed to
///
/// With `trust_proxy` the first valid address in `X-Forwarded-For` (scanned
/// left to right) wins, then `X-Real-IP`; otherwise the peer address.
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        let forwarded = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .find_map(|candidate| candidate.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<IpAddr>().ok());
        if let Some(ip) = real_ip {
            return ip;
        }
    }

    remote
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware rejecting clients inside their cool-down window
pub async fn throttle(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_ip(request.headers(), remote, limiter.trust_proxy_headers());

    if !limiter.check(client, Instant::now()) {
        tracing::warn!("Rate limited {} on {}", client, request.uri().path());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(Ack::error("Too many requests, please retry later")),
        )
            .into_response();
    }

    next.run(request).await
}
