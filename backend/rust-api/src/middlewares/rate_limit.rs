use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::auth::AuthUser;
use crate::metrics::track_cache_operation;
use crate::services::AppState;

const RATE_WINDOW_SECONDS: u64 = 60;

/// Fixed-window request counter keyed by caller.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request against `key`; false once `limit` is reached
    /// within the current window.
    async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> anyhow::Result<bool>;
}

pub struct RedisRateLimiter {
    redis: ConnectionManager,
}

impl RedisRateLimiter {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> anyhow::Result<bool> {
        let mut conn = self.redis.clone();

        // Atomic check-and-increment with expiry on first hit
        let lua_script = r#"
            local key = KEYS[1]
            local limit = tonumber(ARGV[1])
            local window = tonumber(ARGV[2])

            local current = redis.call('GET', key)

            if current == false then
                redis.call('SET', key, 1, 'EX', window)
                return 1
            end

            current = tonumber(current)

            if current >= limit then
                return 0
            end

            redis.call('INCR', key)
            return 1
        "#;

        let allowed: u32 = track_cache_operation("rate_limit", async {
            Ok(redis::Script::new(lua_script)
                .key(key)
                .arg(limit)
                .arg(window_seconds)
                .invoke_async(&mut conn)
                .await?)
        })
        .await?;

        Ok(allowed == 1)
    }
}

/// Process-local limiter owned by the application state.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> anyhow::Result<bool> {
        let window = Duration::from_secs(window_seconds);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        windows.retain(|_, (started, _)| now.duration_since(*started) < window);

        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if entry.1 >= limit {
            return Ok(false);
        }
        entry.1 += 1;
        Ok(true)
    }
}

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Per-user limit for authenticated routes; anonymous callers are keyed by IP.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1" {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(next.run(request).await);
    }

    let key = match request.extensions().get::<AuthUser>() {
        Some(user) => format!("ratelimit:user:{}", user.user_id),
        None => format!(
            "ratelimit:ip:{}",
            extract_client_ip_from(request.headers(), request.extensions())
        ),
    };

    let allowed = state
        .rate_limiter
        .check(&key, state.config.rate_limit_per_user, RATE_WINDOW_SECONDS)
        .await
        .map_err(|e| {
            tracing::error!("Rate limit check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if !allowed {
        tracing::warn!("Rate limit exceeded for {}", key);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(request).await)
}
