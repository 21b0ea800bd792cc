//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay schedule between push attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl BackoffPolicy {
    /// Delay to wait after the `failures`-th failed attempt.
    pub fn delay(&self, failures: u32) -> Duration {
        calculate_backoff(failures, self.base_ms, self.max_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 200,
            max_ms: 5_000,
        }
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);

        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100 && b1.as_millis() < 110);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200 && b2.as_millis() < 220);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);
    }

    #[test]
    fn test_policy_delay_never_overflows() {
        let policy = BackoffPolicy {
            base_ms: u64::MAX / 2,
            max_ms: 50,
        };
        assert!(policy.delay(200).as_millis() < 55);
    }
}
