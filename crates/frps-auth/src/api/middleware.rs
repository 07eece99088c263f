//! Credential gate, rate limiting and request logging middleware.

use crate::error::AuthError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use secrecy::{ExposeSecret, SecretString};
use std::{num::NonZeroU32, sync::Arc};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Path prefix of static assets, always served without credentials.
pub const STATIC_PREFIX: &str = "/auth-statistics";

/// Path of the tunnel server's registration callback.
pub const HANDSHAKE_PATH: &str = "/auth";

/// Global rate limiter (not keyed by IP).
pub type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter state shared across requests.
#[derive(Clone)]
pub struct RateLimitState {
    /// Global rate limiter for all requests
    pub global: Arc<GlobalLimiter>,
}

impl RateLimitState {
    /// Create a new rate limit state with the specified limits.
    pub fn new(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Self {
            global: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create a permissive rate limiter for testing.
    pub fn permissive() -> Self {
        Self::new(10_000)
    }
}

/// Single shared administrator credential pair.
#[derive(Clone)]
pub struct AdminGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    username: String,
    password: SecretString,
    open_handshake: bool,
}

impl AdminGate {
    pub fn new(username: impl Into<String>, password: SecretString, open_handshake: bool) -> Self {
        Self {
            inner: Arc::new(GateInner {
                username: username.into(),
                password,
                open_handshake,
            }),
        }
    }

    /// Empty user name and password turn the gate off.
    pub fn is_disabled(&self) -> bool {
        self.inner.username.is_empty() && self.inner.password.expose_secret().is_empty()
    }

    /// Paths served without credentials.
    pub fn is_exempt(&self, path: &str) -> bool {
        let is_static = path == STATIC_PREFIX || path.starts_with(&format!("{}/", STATIC_PREFIX));
        is_static || (self.inner.open_handshake && path == HANDSHAKE_PATH)
    }

    /// Check a presented credential pair without short-circuiting.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = ct_eq(username, &self.inner.username);
        let pass_ok = ct_eq(password, self.inner.password.expose_secret());
        user_ok & pass_ok
    }
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Decode an `Authorization: Basic` header value into user name and password.
pub fn parse_basic_auth(value: &str) -> Option<(String, String)> {
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Require the administrator credentials on every non-exempt path.
pub async fn admin_auth_middleware(
    State(gate): State<AdminGate>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let path = request.uri().path();
    if gate.is_disabled() || gate.is_exempt(path) {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);

    match presented {
        Some((user, pass)) if gate.verify(&user, &pass) => Ok(next.run(request).await),
        Some((user, _)) => {
            warn!(%user, uri = %request.uri().path(), "Rejected administrator credentials");
            Err(AuthError::Unauthorized)
        }
        None => {
            warn!(uri = %request.uri().path(), "Missing administrator credentials");
            Err(AuthError::Unauthorized)
        }
    }
}

/// Rate limiting middleware.
///
/// Checks the global rate limit and returns 429 Too Many Requests if exceeded.
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if rate_limit.global.check().is_err() {
        warn!("Global rate limit exceeded");
        return Err(AuthError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

/// Logging middleware for requests. Bodies are never logged.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    debug!(%method, %path, "Request started");

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_success() {
        debug!(%method, %path, %status, ?duration, "Request completed");
    } else {
        warn!(%method, %path, %status, ?duration, "Request failed");
    }

    response
}
