//! 重试策略：最多 max_retries + 1 次尝试，指数退避

use std::time::Duration;

use crate::config::ToolsSection;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 不等待的策略（测试用）
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    pub fn from_config(cfg: &ToolsSection, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(cfg.retry_initial_delay_ms),
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
            multiplier: cfg.retry_multiplier.max(1.0),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// 第 attempt 次失败（从 1 计）之后的等待时长；hint 为服务端 retry-after，优先采用，仍受 max_delay 限制
    pub fn delay_after(&self, attempt: u32, hint_ms: Option<u64>) -> Duration {
        match hint_ms {
            Some(ms) => Duration::from_millis(ms).min(self.max_delay),
            None => {
                let exp = attempt.saturating_sub(1).min(30) as i32;
                let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
                Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_after(1, None), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2, None), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3, None), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4, None), Duration::from_millis(500));
    }

    #[test]
    fn test_retry_after_hint_wins() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1, Some(250)), Duration::from_millis(250));
        assert_eq!(policy.delay_after(1, Some(60_000)), policy.max_delay);
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(RetryPolicy::immediate(2).max_attempts(), 3);
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
    }
}
