//! 重试机制模块
//!
//! 部署请求的指数退避重试。只有 [`crate::error::ChainError::is_retryable`] 为真的错误才会重试。

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（至少一次）
    pub max_attempts: usize,
    /// 初始延迟时间
    pub initial_delay: Duration,
    /// 最大延迟时间
    pub max_delay: Duration,
    /// 退避倍数
    pub backoff_multiplier: f64,
    /// 抖动因子（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 创建新的重试策略
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// 设置初始延迟时间
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// 设置最大延迟时间
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// 设置退避倍数
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// 设置抖动因子
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// 第 `attempt` 次失败后的等待时间
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);

        let max_delay_ms = self.max_delay.as_millis() as f64;
        let delay_ms = base_delay.min(max_delay_ms);

        // 添加抖动
        let jitter = delay_ms * self.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay_ms = (delay_ms + jitter).max(0.0) as u64;

        Duration::from_millis(final_delay_ms)
    }
}

/// 重试执行器
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// 创建新的重试执行器
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// 执行带重试的异步操作，`label` 只用于日志
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        log::info!("{} succeeded after {} attempts", label, attempt + 1);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        log::debug!("{} failed with non-retryable error: {}", label, error);
                        return Err(error);
                    }

                    if attempt + 1 >= attempts {
                        log::error!("{} failed after {} attempts", label, attempts);
                        return Err(error);
                    }

                    let delay = self.policy.delay_for(attempt);
                    log::warn!(
                        "{} attempt {} failed: {}, retrying in {:?}",
                        label,
                        attempt + 1,
                        error,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::new(5)
            .with_initial_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(60))
            .with_backoff_multiplier(1.5)
            .with_jitter_factor(2.0);

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(200));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert_eq!(policy.backoff_multiplier, 1.5);
        assert_eq!(policy.jitter_factor, 1.0);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300))
            .with_jitter_factor(0.0);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(5), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let executor = RetryExecutor::new(fast(3));

        let counter_clone = counter.clone();
        let result = executor
            .execute("save_config", move || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(ChainError::network("connection refused"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let counter = Arc::new(AtomicUsize::new(0));
        let executor = RetryExecutor::new(fast(2));

        let counter_clone = counter.clone();
        let result: Result<()> = executor
            .execute("save_config", move || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ChainError::timeout("slow"))
                }
            })
            .await;

        assert!(matches!(result, Err(ChainError::Timeout(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error() {
        let result = RetryExecutor::default()
            .execute("save_config", || async {
                Err::<i32, ChainError>(ChainError::deploy("Config validation failed"))
            })
            .await;

        assert!(matches!(result.unwrap_err(), ChainError::Deploy(_)));
    }
}
