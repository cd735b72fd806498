//! 重连退避策略
//!
//! 延迟从 1 秒开始，每次失败翻倍，封顶 180 秒：
//! 1, 2, 4, 8, 16, 32, 64, 128, 180, 180, ...
//! 每轮重连（从断开开始）都从初始延迟重新计算。

use std::time::Duration;

pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(180);

#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            failures: 0,
        }
    }

    /// 记录一次失败，返回到下一次尝试前的等待时长。
    pub fn next_delay(&mut self) -> Duration {
        let delay = 2u32
            .checked_pow(self.failures)
            .and_then(|factor| self.initial.checked_mul(factor))
            .map(|delay| delay.min(self.max))
            .unwrap_or(self.max);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(INITIAL_RECONNECT_DELAY, MAX_RECONNECT_DELAY)
    }
}
