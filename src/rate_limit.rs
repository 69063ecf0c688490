//! 按客户端地址的滑动窗口限流。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::{middleware, response::Response};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ApiError;

#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// 每个窗口最多 `limit` 次请求；为 0 时不限流。
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 判断请求是否放行；被拒绝的请求不计入窗口。
    pub async fn admit(&self, client: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut windows = self.windows.lock().await;
        let entries = windows.entry(client.to_string()).or_default();
        while let Some(oldest) = entries.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= self.limit {
            return false;
        }
        entries.push_back(now);
        true
    }

    /// 清理窗口内没有请求的客户端，返回清理数量。
    pub async fn prune_idle(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, entries| {
            entries
                .back()
                .is_some_and(|newest| now.saturating_duration_since(*newest) < self.window)
        });
        before - windows.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// 限流中间件：超出窗口配额时返回 429。
pub async fn rate_limit_middleware(
    Extension(limiter): Extension<Arc<RateLimiter>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !limiter.admit(&client, Instant::now()).await {
        warn!(client, path = req.uri().path(), "rate limited");
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(req).await)
}
