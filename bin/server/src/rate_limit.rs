//! Per-client rate limiting.
//!
//! A token bucket per client IP, refilled continuously at
//! `requests_per_window / window`. Reads and writes get separate layers so a
//! client hammering the inbox cannot starve its own likes and reports.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Limits for one layer.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Bucket size, and tokens restored per window.
    pub requests_per_window: u32,
    pub window: Duration,
    /// Buckets idle for longer than this are dropped.
    pub idle_eviction: Duration,
    /// Honour `X-Forwarded-For` / `X-Real-IP`. Only safe behind a proxy
    /// that overwrites them.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 600,
            window: Duration::from_secs(10),
            idle_eviction: Duration::from_secs(300),
            trust_proxy_headers: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            refilled_at: now,
        }
    }

    fn try_take(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        let capacity = f64::from(config.requests_per_window);
        let rate = capacity / config.window.as_secs_f64();
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.refilled_at = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Limiter {
    buckets: HashMap<IpAddr, Bucket>,
    config: RateLimitConfig,
    evicted_at: Instant,
}

impl Limiter {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: HashMap::new(),
            config,
            evicted_at: Instant::now(),
        }
    }

    fn admit(&mut self, ip: IpAddr, now: Instant) -> bool {
        if now.saturating_duration_since(self.evicted_at) > self.config.idle_eviction {
            let idle = self.config.idle_eviction;
            let before = self.buckets.len();
            self.buckets
                .retain(|_, b| now.saturating_duration_since(b.refilled_at) <= idle);
            debug!(evicted = before - self.buckets.len(), "Evicted idle rate limit buckets");
            self.evicted_at = now;
        }

        let capacity = self.config.requests_per_window;
        let config = self.config;
        self.buckets
            .entry(ip)
            .or_insert_with(|| Bucket::full(capacity, now))
            .try_take(&config, now)
    }
}

/// Tower layer applying one [`RateLimitConfig`].
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<Mutex<Limiter>>,
}

impl RateLimitLayer {
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            limiter: Arc::new(Mutex::new(Limiter::new(config))),
        }
    }

    /// Limits for pulls, counters and stream connects.
    pub fn for_reads(trust_proxy_headers: bool) -> Self {
        Self::with_config(RateLimitConfig {
            requests_per_window: 1000,
            trust_proxy_headers,
            ..RateLimitConfig::default()
        })
    }

    /// Limits for commands.
    pub fn for_writes(trust_proxy_headers: bool) -> Self {
        Self::with_config(RateLimitConfig {
            requests_per_window: 300,
            trust_proxy_headers,
            ..RateLimitConfig::default()
        })
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<Mutex<Limiter>>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let (admitted, retry_after) = {
            let mut limiter = self.limiter.lock().unwrap_or_else(|poisoned| {
                warn!("Rate limiter lock was poisoned, recovering");
                poisoned.into_inner()
            });
            let retry_after = limiter.config.window.as_secs().max(1);
            // Unknown clients are refused rather than sharing one bucket.
            let admitted = match client_ip(&req, limiter.config.trust_proxy_headers) {
                Some(ip) => {
                    let ok = limiter.admit(ip, Instant::now());
                    if !ok {
                        warn!(%ip, "Rate limit exceeded");
                    }
                    ok
                }
                None => {
                    warn!("Could not determine client IP, refusing request");
                    false
                }
            };
            (admitted, retry_after)
        };

        if !admitted {
            let response = (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(json!({
                    "error": "RateLimited",
                    "message": "Too many requests, slow down",
                })),
            )
                .into_response();
            return Box::pin(async move { Ok(response) });
        }

        Box::pin(self.inner.call(req))
    }
}

fn client_ip<B>(req: &Request<B>, trust_proxy_headers: bool) -> Option<IpAddr> {
    if trust_proxy_headers {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok());
        if forwarded.is_some() {
            return forwarded;
        }
        let real = req
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        if real.is_some() {
            return real;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight() -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: 3,
            window: Duration::from_secs(1),
            idle_eviction: Duration::from_secs(60),
            trust_proxy_headers: false,
        }
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let config = tight();
        let start = Instant::now();
        let mut bucket = Bucket::full(3, start);

        for _ in 0..3 {
            assert!(bucket.try_take(&config, start));
        }
        assert!(!bucket.try_take(&config, start));

        // One third of a second restores one token.
        let later = start + Duration::from_millis(340);
        assert!(bucket.try_take(&config, later));
        assert!(!bucket.try_take(&config, later));
    }

    #[test]
    fn test_limiter_is_per_ip() {
        let mut limiter = Limiter::new(tight());
        let now = Instant::now();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.admit(a, now));
        }
        assert!(!limiter.admit(a, now));
        assert!(limiter.admit(b, now));
    }

    #[test]
    fn test_proxy_headers_ignored_unless_trusted() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req, false), None);
        assert_eq!(client_ip(&req, true), Some("203.0.113.9".parse().unwrap()));
    }
}
