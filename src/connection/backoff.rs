use std::time::Duration;

use crate::config::ReconnectConfig;

/// 再接続待ち時間: `min(max, attempt * step)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    step: Duration,
    max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(config.step(), config.max())
    }
}

impl ReconnectPolicy {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self { step, max }
    }

    /// `attempt` は切断ごとに1から数える（接続成功で0に戻る）
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly_then_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (1..=7).map(|a| policy.delay(a).as_millis()).collect();
        assert_eq!(delays, vec![2_000, 4_000, 6_000, 8_000, 10_000, 10_000, 10_000]);
    }

    #[test]
    fn huge_attempt_count_does_not_overflow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(10_000));
    }
}
