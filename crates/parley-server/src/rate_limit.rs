//! Token-bucket throttling for HTTP clients (keyed by IP) and WebSocket
//! actions (keyed by identity).

use std::collections::HashMap;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

use parley_shared::types::UserId;

use crate::error::ServerError;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    touched: Instant,
}

impl Bucket {
    fn full(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            touched: Instant::now(),
        }
    }

    fn take(&mut self, rate: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let refill = now.duration_since(self.touched).as_secs_f64() * rate;
        self.touched = now;
        self.tokens = (self.tokens + refill).min(capacity);

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}

/// One bucket per key, refilled at `rate` tokens/s up to `capacity`.
#[derive(Clone)]
pub struct RateLimiter<K> {
    buckets: Arc<Mutex<HashMap<K, Bucket>>>,
    rate: f64,
    capacity: f64,
}

/// HTTP limiter, keyed by client address.
pub type IpRateLimiter = RateLimiter<IpAddr>;

/// WebSocket action limiter, keyed by authenticated identity.
pub type EventRateLimiter = RateLimiter<UserId>;

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate,
            capacity,
        }
    }

    /// Spend one token for `key`; `false` means the caller is over its limit.
    pub async fn check(&self, key: &K) -> bool {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket::full(self.capacity))
            .take(self.rate, self.capacity)
    }

    /// Forget keys that have not been seen for `max_idle`.
    pub async fn purge_stale(&self, max_idle: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .await
            .retain(|_, bucket| now.duration_since(bucket.touched) < max_idle);
    }
}

pub async fn http_rate_limit(
    State(limiter): State<IpRateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    if let Some(ip) = client_ip(&req) {
        if !limiter.check(&ip).await {
            warn!(ip = %ip, path = %req.uri().path(), "HTTP rate limit exceeded");
            return Err(ServerError::RateLimited);
        }
    }

    Ok(next.run(req).await)
}

/// Peer address if the listener recorded one, else the first proxy header
/// that parses.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }

    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_refusal() {
        let limiter = IpRateLimiter::new(10.0, 5.0);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert!(limiter.check(&ip).await);
        }
        assert!(!limiter.check(&ip).await);
    }

    #[tokio::test]
    async fn test_identities_have_separate_buckets() {
        let limiter = EventRateLimiter::new(1.0, 2.0);
        let (alice, bob) = (UserId::new(), UserId::new());

        assert!(limiter.check(&alice).await);
        assert!(limiter.check(&alice).await);
        assert!(!limiter.check(&alice).await);
        assert!(limiter.check(&bob).await);
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let limiter = IpRateLimiter::new(10.0, 5.0);
        let ip: IpAddr = "192.168.1.1".parse().unwrap();
        assert!(limiter.check(&ip).await);

        limiter.purge_stale(Duration::ZERO).await;
        assert!(limiter.buckets.lock().await.is_empty());
    }

    #[test]
    fn test_client_ip_from_forwarded_header() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some("203.0.113.7".parse().unwrap()));

        let req = Request::builder()
            .header("x-real-ip", " 198.51.100.2 ")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), Some("198.51.100.2".parse().unwrap()));

        let req = Request::builder().body(()).unwrap();
        assert_eq!(client_ip(&req), None);
    }
}
