//! Per-client rate limiting for the whole /api surface.
//!
//! Fixed window keyed by client address: each address gets a budget of
//! requests per window, and the counter resets when the window rolls over.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Thread-safe per-address request counter.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<IpAddr, WindowEntry>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window: Duration::from_secs(config.window_seconds),
            config,
        }
    }

    /// Consume one request from the address's budget. Returns
    /// `Err(retry_after_seconds)` when the budget is exhausted.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut entry = self.entries.entry(ip).or_insert_with(|| WindowEntry {
            count: 0,
            window_start: now,
        });

        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Ok(())
        } else {
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            Err(retry_after)
        }
    }

    /// Drop entries whose window has long expired.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window * 2;
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }
}

/// Extract client IP from request headers
fn extract_client_ip(request: &Request<Body>) -> IpAddr {
    // Check X-Forwarded-For header first (for reverse proxy setups)
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip_str) = value.split(',').next() {
                if let Ok(ip) = ip_str.trim().parse::<IpAddr>() {
                    return ip;
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            if let Ok(ip) = value.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    IpAddr::from([127, 0, 0, 1])
}

/// Middleware guarding the /api routes.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&request);

    match state.rate_limiter.check(ip) {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after) => {
            let mut response = ApiError::rate_limited(
                "Too many requests from this IP, please try again later",
            )
            .into_response();
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
            Err(response)
        }
    }
}

/// Spawn a background task to periodically drop stale counters.
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(max_requests: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_requests,
            window_seconds: 3600,
        }
    }

    #[test]
    fn allows_requests_under_limit() {
        let limiter = RateLimiter::new(test_config(10));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for i in 0..10 {
            assert!(limiter.check(ip).is_ok(), "request {} should be allowed", i);
        }
    }

    #[test]
    fn blocks_after_limit() {
        let limiter = RateLimiter::new(test_config(3));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..3 {
            let _ = limiter.check(ip);
        }
        assert!(limiter.check(ip).is_err());
    }

    #[test]
    fn addresses_have_separate_budgets() {
        let limiter = RateLimiter::new(test_config(1));
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        assert!(limiter.check(ip1).is_ok());
        assert!(limiter.check(ip1).is_err());
        assert!(limiter.check(ip2).is_ok());
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let mut config = test_config(1);
        config.enabled = false;
        let limiter = RateLimiter::new(config);
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..100 {
            assert!(limiter.check(ip).is_ok());
        }
    }
}
