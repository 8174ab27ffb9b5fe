use std::time::Duration;

/// Exponential retry policy: attempt `n` waits `base * 2^(n-1)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Delay before re-queueing a job whose counter is now `retry_count`.
    /// Returns `None` once the retry ceiling is exceeded.
    pub fn delay_for(&self, retry_count: u32) -> Option<Duration> {
        if retry_count == 0 || retry_count > self.max_retries {
            return None;
        }
        let factor = 1u32.checked_shl(retry_count - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}
