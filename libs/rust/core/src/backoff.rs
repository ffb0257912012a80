//! Exponential back-off with jitter, used where a loop must pause after failures.

use std::time::Duration;
use rand::{thread_rng, Rng};

#[derive(Debug, Clone)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: f64, // 0.0 - 1.0
}

impl Default for Backoff { fn default() -> Self { Self { base: Duration::from_secs(60), max: Duration::from_secs(300), jitter: 0.1 } } }

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self { Self { base, max: max.max(base), jitter: 0.0 } }
    pub fn with_jitter(mut self, jitter: f64) -> Self { self.jitter = jitter.clamp(0.0, 1.0); self }

    /// Delay before resuming after `failures` consecutive failures (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16) as i32;
        let mut delay = std::cmp::min(self.base.mul_f64(2f64.powi(exp)), self.max);
        if self.jitter > 0.0 {
            let jitter_ms = (delay.as_millis() as f64 * self.jitter) as i64;
            let offset: i64 = thread_rng().gen_range(-jitter_ms..=jitter_ms);
            let ms = (delay.as_millis() as i64 + offset).max(0) as u64;
            delay = std::cmp::min(Duration::from_millis(ms), self.max);
        }
        delay
    }
}
