use std::time::Duration;

use agora_core::{ReconnectConfig, ReconnectStrategy};

/// Reconnect delay schedule for one manager.
///
/// Counts consecutive failed attempts; [`reset`](Self::reset) is called
/// whenever a connection reaches `Open`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` when reconnecting is disabled
    /// or `max_attempts` is used up.
    ///
    /// Exponential schedule: base → 2·base → 4·base → … capped at `max_delay_ms`,
    /// plus up to `jitter` of the capped value.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }
        if let Some(max) = self.config.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }
        self.attempts += 1;

        let ms = match self.config.strategy {
            ReconnectStrategy::Fixed => self.config.delay_ms,
            ReconnectStrategy::Exponential => {
                let factor = 1u64.checked_shl(self.attempts - 1).unwrap_or(u64::MAX);
                let capped = self
                    .config
                    .delay_ms
                    .saturating_mul(factor)
                    .min(self.config.max_delay_ms);
                capped.saturating_add(jitter_ms(capped, self.config.jitter))
            }
        };
        Some(Duration::from_millis(ms))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Return a jitter offset (0 … `fraction * base_ms`) in milliseconds.
///
/// Derived from the sub-second part of the wall clock; spreading clients is
/// all that is needed here, not unpredictability.
fn jitter_ms(base_ms: u64, fraction: f64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_ms as f64) * fraction.clamp(0.0, 1.0)) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: ReconnectStrategy) -> ReconnectConfig {
        ReconnectConfig {
            strategy,
            delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: 0.0,
            ..ReconnectConfig::default()
        }
    }

    #[test]
    fn fixed_delay_never_grows() {
        let mut backoff = Backoff::new(config(ReconnectStrategy::Fixed));
        for _ in 0..20 {
            assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        }
    }

    #[test]
    fn exponential_doubles_up_to_cap() {
        let mut backoff = Backoff::new(config(ReconnectStrategy::Exponential));
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay().unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn exponential_survives_many_attempts() {
        let mut backoff = Backoff::new(config(ReconnectStrategy::Exponential));
        for _ in 0..200 {
            assert!(backoff.next_delay().unwrap() <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let mut cfg = config(ReconnectStrategy::Exponential);
        cfg.jitter = 0.1;
        let mut backoff = Backoff::new(cfg);
        let first = backoff.next_delay().unwrap().as_millis() as u64;
        assert!((100..110).contains(&first));
    }

    #[test]
    fn max_attempts_exhausts_and_reset_restores() {
        let mut cfg = config(ReconnectStrategy::Fixed);
        cfg.max_attempts = Some(2);
        let mut backoff = Backoff::new(cfg);

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn disabled_never_schedules() {
        let mut cfg = config(ReconnectStrategy::Fixed);
        cfg.enabled = false;
        assert!(Backoff::new(cfg).next_delay().is_none());
    }
}
