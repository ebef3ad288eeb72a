use std::time::Duration;

pub fn exponential_jitter_backoff(
    base: Duration,
    attempt: u32,
    max: Duration,
    jitter_frac: f32,
) -> Duration {
    let factor = 1u32 << attempt.min(8);
    let capped = base.saturating_mul(factor).min(max);
    let nanos = capped.as_nanos() as i128;
    let jitter = ((nanos as f64) * f64::from(jitter_frac.clamp(0.0, 1.0))).round() as i128;
    let delta = if jitter > 0 {
        fastrand::i128(-jitter..=jitter)
    } else {
        0
    };
    Duration::from_nanos((nanos + delta).max(0) as u64)
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter_frac: f32,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(60),
            jitter_frac: 0.2,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        exponential_jitter_backoff(
            self.base,
            attempt.saturating_sub(1),
            self.max,
            self.jitter_frac,
        )
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_and_caps() {
        let base = Duration::from_millis(200);
        let max = Duration::from_secs(5);
        let a1 = exponential_jitter_backoff(base, 1, max, 0.0);
        let a4 = exponential_jitter_backoff(base, 4, max, 0.0);
        let a20 = exponential_jitter_backoff(base, 20, max, 0.0);
        assert_eq!(a1, Duration::from_millis(400));
        assert!(a4 >= a1);
        assert_eq!(a20, max);
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter_frac: 0.5,
            max_attempts: 3,
        };
        for _ in 0..50 {
            let d = policy.delay(1);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150));
        }
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }
}
