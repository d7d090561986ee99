// Reconnect delay: exponential from `base`, capped at `max`, with +/- jitter.
// Same shape as the socket.io client's default backoff (1s doubling to 5s, factor 0.5).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    randomization_factor: f64,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, randomization_factor: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            randomization_factor: randomization_factor.clamp(0.0, 1.0),
            attempts: 0,
        }
    }

    /// Delay before the next attempt; each call counts one attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exp = 2u32.saturating_pow(self.attempts.min(31));
        let raw = self.base.saturating_mul(exp).min(self.max);
        self.attempts = self.attempts.saturating_add(1);

        if self.randomization_factor == 0.0 {
            return raw;
        }
        let deviation = raw.mul_f64(self.randomization_factor * fastrand::f64());
        let jittered = if fastrand::bool() {
            raw.saturating_sub(deviation)
        } else {
            raw.saturating_add(deviation)
        };
        jittered.min(self.max)
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
