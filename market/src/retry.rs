use std::time::Duration;

use rand::Rng;

/// Jittered exponential backoff between attempts against one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let base_delay_ms = base_delay_ms.max(1);
        Self {
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay(&self, retry: usize) -> Duration {
        let exp = 2_u64.saturating_pow(retry.min(32) as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);

        if self.jitter_pct <= 0.0 {
            return Duration::from_millis(delay);
        }

        let spread = (delay as f64 * self.jitter_pct) as i64;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(delay.saturating_add_signed(delta))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(200, 2_000, 0.2)
    }
}
