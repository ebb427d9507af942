use std::time::Duration;

use rand::{RngCore, SeedableRng, rngs::StdRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    /// Jitter is drawn from `0..=delay / jitter_max_divisor`; `0` disables it.
    pub jitter_max_divisor: u32,
}

impl BackoffConfig {
    pub const IMMEDIATE: Self = Self {
        base: Duration::ZERO,
        cap: Duration::ZERO,
        jitter_max_divisor: 0,
    };
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            cap: Duration::from_secs(2),
            jitter_max_divisor: 4,
        }
    }
}

/// Delay schedule between retries of a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self { backoff }
    }

    pub fn immediate() -> Self {
        Self::new(BackoffConfig::IMMEDIATE)
    }

    pub fn start(&self) -> BackoffState<StdRng> {
        BackoffState::new(self.backoff, StdRng::from_entropy())
    }
}

#[derive(Debug)]
pub struct BackoffState<R> {
    cfg: BackoffConfig,
    attempt: u32,
    rng: R,
}

impl<R: RngCore> BackoffState<R> {
    pub fn new(cfg: BackoffConfig, rng: R) -> Self {
        Self {
            cfg,
            attempt: 0,
            rng,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = base_delay_for_attempt(self.cfg.base, self.cfg.cap, self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let base_ms = base.as_millis().min(u128::from(u64::MAX)) as u64;
        let jitter_max_ms = if self.cfg.jitter_max_divisor == 0 {
            0
        } else {
            base_ms / u64::from(self.cfg.jitter_max_divisor)
        };
        let jitter_ms = if jitter_max_ms == 0 {
            0
        } else {
            self.rng.next_u64() % (jitter_max_ms + 1)
        };

        let total_ms = base_ms.saturating_add(jitter_ms);
        std::cmp::min(self.cfg.cap, Duration::from_millis(total_ms))
    }
}

fn base_delay_for_attempt(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let mut delay = base;
    for _ in 0..attempt {
        delay = match delay.checked_mul(2) {
            Some(v) => v,
            None => return cap,
        };
        if delay >= cap {
            return cap;
        }
    }
    std::cmp::min(delay, cap)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn backoff_base_doubles_and_caps() {
        let base = Duration::from_millis(50);
        let cap = Duration::from_millis(300);

        assert_eq!(
            base_delay_for_attempt(base, cap, 0),
            Duration::from_millis(50)
        );
        assert_eq!(
            base_delay_for_attempt(base, cap, 1),
            Duration::from_millis(100)
        );
        assert_eq!(
            base_delay_for_attempt(base, cap, 2),
            Duration::from_millis(200)
        );
        assert_eq!(
            base_delay_for_attempt(base, cap, 3),
            Duration::from_millis(300)
        );
        assert_eq!(
            base_delay_for_attempt(base, cap, 40),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn backoff_jitter_is_bounded_and_deterministic_with_seeded_rng() {
        let cfg = BackoffConfig {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            jitter_max_divisor: 4,
        };

        let mut backoff = BackoffState::new(cfg, StdRng::seed_from_u64(1));
        let d0 = backoff.next_delay();
        assert!(d0 >= Duration::from_secs(1));
        assert!(d0 <= Duration::from_millis(1250));

        let d1 = backoff.next_delay();
        assert!(d1 >= Duration::from_secs(2));
        assert!(d1 <= Duration::from_millis(2500));
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let mut backoff = RetryPolicy::immediate().start();
        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Duration::ZERO);
        }
    }
}
