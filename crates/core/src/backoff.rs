//! Sleep interval calculators used by the worker loops.

use std::time::Duration;

/// Interval that doubles after every success, up to a ceiling.
///
/// Backfill uses this to slow down as it approaches the present.
#[derive(Debug, Clone, Copy)]
pub struct DoublingInterval {
    max: Duration,
}

impl DoublingInterval {
    pub fn new(max: Duration) -> Self {
        Self { max }
    }

    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Linear backoff for workers that found nothing to do.
///
/// The delay grows by `step` per consecutive idle batch and is capped at
/// `max`. A batch that did work resets the idle count to zero.
#[derive(Debug, Clone, Copy)]
pub struct IdleBackoff {
    step: Duration,
    max: Duration,
}

impl IdleBackoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self { step, max }
    }

    pub fn delay(&self, idle_count: u32) -> Duration {
        self.step.saturating_mul(idle_count).min(self.max)
    }
}

/// Tiered inter-cycle delay for the file sync loop.
///
/// Tier 0 applies while the loop is busy; each further tier covers three
/// consecutive idle cycles, and the last tier holds from then on.
#[derive(Debug, Clone)]
pub struct IdleTiers {
    tiers: Vec<Duration>,
}

impl IdleTiers {
    /// Build from a tier list. An empty list falls back to a single 30s tier.
    pub fn new(tiers: Vec<Duration>) -> Self {
        if tiers.is_empty() {
            Self {
                tiers: vec![Duration::from_secs(30)],
            }
        } else {
            Self { tiers }
        }
    }

    pub fn from_secs(tiers: &[u64]) -> Self {
        Self::new(tiers.iter().copied().map(Duration::from_secs).collect())
    }

    pub fn delay(&self, idle_count: u32) -> Duration {
        let index = if idle_count == 0 {
            0
        } else {
            ((idle_count as usize - 1) / 3 + 1).min(self.tiers.len() - 1)
        };
        self.tiers[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_interval_caps() {
        let interval = DoublingInterval::new(Duration::from_secs(86_400));
        let mut current = Duration::from_secs(10);
        let mut seen = Vec::new();
        for _ in 0..16 {
            current = interval.next(current);
            seen.push(current.as_secs());
        }
        assert_eq!(&seen[..4], &[20, 40, 80, 160]);
        assert_eq!(*seen.last().unwrap(), 86_400);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_idle_backoff_is_monotonic_and_capped() {
        let backoff = IdleBackoff::new(Duration::from_secs(30), Duration::from_secs(3600));
        let delays: Vec<u64> = (1..=200).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(delays[0], 30);
        assert_eq!(delays[1], 60);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), 3600);
        assert_eq!(backoff.delay(0), Duration::ZERO);
    }

    #[test]
    fn test_idle_tiers() {
        let tiers = IdleTiers::from_secs(&[30, 60, 120, 180]);
        let secs: Vec<u64> = (0..=10).map(|n| tiers.delay(n).as_secs()).collect();
        assert_eq!(secs, vec![30, 60, 60, 60, 120, 120, 120, 180, 180, 180, 180]);
    }

    #[test]
    fn test_idle_tiers_empty_falls_back() {
        let tiers = IdleTiers::new(Vec::new());
        assert_eq!(tiers.delay(5), Duration::from_secs(30));
    }
}
