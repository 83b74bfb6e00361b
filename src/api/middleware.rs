//! Authentication and rate limiting middleware.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use uuid::Uuid;

use crate::models::CallerIdentity;

/// Security configuration loaded from environment variables.
#[derive(Clone, Debug, Default)]
pub struct SecurityConfig {
    /// Bearer token to user id (from NESTED_TODOS_TOKENS, `token=uuid` comma-separated).
    /// Empty means single-user local mode.
    pub tokens: HashMap<String, Uuid>,
    /// Allowed CORS origins (from NESTED_TODOS_CORS_ORIGINS, comma-separated)
    pub cors_origins: Option<Vec<String>>,
    /// Rate limiter instance
    pub rate_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    /// Load security configuration from environment variables.
    pub fn from_env() -> Self {
        let tokens = std::env::var("NESTED_TODOS_TOKENS")
            .map(|s| parse_tokens(&s))
            .unwrap_or_default();

        let cors_origins = std::env::var("NESTED_TODOS_CORS_ORIGINS")
            .ok()
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect());

        let rate_limit = std::env::var("NESTED_TODOS_RATE_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(100);

        // Local single-user mode is not rate limited
        let rate_limiter = if tokens.is_empty() {
            None
        } else {
            Some(RateLimiter::new(rate_limit, Duration::from_secs(60)))
        };

        Self {
            tokens,
            cors_origins,
            rate_limiter,
        }
    }

    /// Local single-user mode with no authentication (for development/testing).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Authenticate the given tokens, each acting as its user.
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (S, Uuid)>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(|(t, u)| (t.into(), u)).collect(),
            ..Self::default()
        }
    }

    /// Create a config with specific CORS origins.
    pub fn with_cors_origins(origins: Vec<String>) -> Self {
        Self {
            cors_origins: Some(origins),
            ..Self::default()
        }
    }

    /// Create a config with rate limiting enabled.
    pub fn with_rate_limit(max_requests: u32) -> Self {
        Self {
            rate_limiter: Some(RateLimiter::new(max_requests, Duration::from_secs(60))),
            ..Self::default()
        }
    }

    /// Resolve a bearer token to the identity it acts as.
    pub fn identify(&self, token: &str) -> Option<CallerIdentity> {
        self.tokens.get(token).copied().map(CallerIdentity::new)
    }
}

/// Parse `token=uuid,token2=uuid`. Malformed entries are skipped with a warning.
fn parse_tokens(raw: &str) -> HashMap<String, Uuid> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = entry
                .split_once('=')
                .and_then(|(token, user)| Some((token.trim(), Uuid::parse_str(user.trim()).ok()?)))
                .filter(|(token, _)| !token.is_empty());
            if parsed.is_none() {
                tracing::warn!("Ignoring malformed entry in NESTED_TODOS_TOKENS");
            }
            parsed.map(|(token, user)| (token.to_string(), user))
        })
        .collect()
}

/// Simple in-memory rate limiter using sliding window.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// Maximum requests allowed per window
    max_requests: u32,
    /// Time window duration
    window: Duration,
    /// Request counts per IP
    requests: Arc<Mutex<HashMap<IpAddr, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if a request from the given IP is allowed.
    /// Returns true if allowed, false if rate limited.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();

        let Ok(mut requests) = self.requests.lock() else {
            tracing::error!("Rate limiter lock poisoned, allowing request");
            return true;
        };

        // Forget every IP with nothing left in the window, not just this one
        if let Some(cutoff) = now.checked_sub(self.window) {
            requests.retain(|_, times| {
                times.retain(|&t| t > cutoff);
                !times.is_empty()
            });
        }

        let entry = requests.entry(ip).or_default();
        if entry.len() < self.max_requests as usize {
            entry.push(now);
            true
        } else {
            false
        }
    }

    /// Number of IPs with requests still inside the window.
    pub fn tracked_ips(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

/// Resolves the bearer token to a [`CallerIdentity`] request extension.
///
/// With no tokens configured every request acts as [`CallerIdentity::local`].
pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if config.tokens.is_empty() {
        request.extensions_mut().insert(CallerIdentity::local());
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let identity = match auth_header {
        Some(header) => match header.strip_prefix("Bearer ") {
            Some(token) => config.identify(token),
            None => {
                tracing::warn!("Invalid Authorization header format");
                return Err(StatusCode::UNAUTHORIZED);
            }
        },
        None => {
            tracing::warn!("Missing Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    match identity {
        Some(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!("Unknown bearer token provided");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Rate limiting middleware.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = extract_client_ip(&request);

    if rate_limiter.check(ip) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rate limit exceeded for IP: {}", ip);
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Extract client IP from proxy headers, falling back to loopback.
fn extract_client_ip(request: &Request<Body>) -> IpAddr {
    let header_ip = |name: &str| -> Option<IpAddr> {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok())
    };

    header_ip("X-Forwarded-For")
        .or_else(|| header_ip("X-Real-IP"))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_requests_under_limit() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        for _ in 0..5 {
            assert!(limiter.check(ip));
        }
    }

    #[test]
    fn rate_limiter_blocks_requests_over_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn rate_limiter_tracks_ips_independently() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        assert!(limiter.check(ip1));
        assert!(limiter.check(ip1));
        assert!(!limiter.check(ip1));

        assert!(limiter.check(ip2));
        assert!(limiter.check(ip2));
        assert!(!limiter.check(ip2));
    }

    #[test]
    fn rate_limiter_forgets_ips_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        assert!(limiter.check(ip1));
        assert!(!limiter.check(ip1));
        assert_eq!(limiter.tracked_ips(), 1);

        std::thread::sleep(Duration::from_millis(40));

        assert!(limiter.check(ip2));
        assert_eq!(limiter.tracked_ips(), 1);
        assert!(limiter.check(ip1));
        assert_eq!(limiter.tracked_ips(), 2);
    }

    #[test]
    fn disabled_config_is_local_mode() {
        let config = SecurityConfig::disabled();
        assert!(config.tokens.is_empty());
        assert!(config.cors_origins.is_none());
        assert!(config.rate_limiter.is_none());
    }

    #[test]
    fn identify_resolves_known_tokens_only() {
        let alice = Uuid::new_v4();
        let config = SecurityConfig::with_tokens([("alice-token", alice)]);

        assert_eq!(config.identify("alice-token"), Some(CallerIdentity::new(alice)));
        assert_eq!(config.identify("bob-token"), None);
    }

    #[test]
    fn parse_tokens_skips_malformed_entries() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let raw = format!(" a={} , broken, =x, b = {} ,c=not-a-uuid,", alice, bob);

        let tokens = parse_tokens(&raw);

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.get("a"), Some(&alice));
        assert_eq!(tokens.get("b"), Some(&bob));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("X-Forwarded-For", "10.0.0.7, 10.0.0.1")
            .header("X-Real-IP", "10.0.0.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&request), "10.0.0.7".parse::<IpAddr>().unwrap());

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_client_ip(&request), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
