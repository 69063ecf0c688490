//! 限流窗口的后台定期清理任务。

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::RATE_LIMIT_SWEEP_INTERVAL_SECS;
use crate::rate_limit::RateLimiter;

/// 启动后台任务（定期清理空闲客户端的限流窗口）。
pub fn spawn_background_tasks(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(RATE_LIMIT_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            sweep_idle_windows(&limiter, Instant::now()).await;
        }
    });
}

/// 执行一次清理，返回被移除的客户端数量。
pub async fn sweep_idle_windows(limiter: &RateLimiter, now: Instant) -> usize {
    let evicted = limiter.prune_idle(now).await;
    if evicted > 0 {
        let remaining = limiter.tracked_clients().await;
        debug!(evicted, remaining, "pruned idle rate-limit windows");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_runs_on_a_spawned_task() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(60)));
        let start = Instant::now();
        limiter.admit("stale", start).await;
        limiter.admit("fresh", start + Duration::from_secs(100)).await;

        let task_limiter = limiter.clone();
        let evicted = tokio::spawn(async move {
            sweep_idle_windows(&task_limiter, start + Duration::from_secs(120)).await
        })
        .await
        .expect("join sweep task");

        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }
}
