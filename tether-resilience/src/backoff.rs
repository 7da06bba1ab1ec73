//! Backoff strategies for retry policies

use std::time::Duration;

/// Backoff strategy for retries
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,

    /// Exponential increase: delay = initial_delay * base^(attempt-1)
    Exponential {
        /// Base for exponential calculation (e.g., 2.0 for doubling)
        base: f64,
    },
}

/// Backoff delay calculator
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    initial_delay: Duration,
    max_delay: Duration,
}

impl BackoffCalculator {
    pub fn new(strategy: BackoffStrategy, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            strategy,
            initial_delay,
            max_delay,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt).min(self.max_delay)
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,

            BackoffStrategy::Exponential { base } => {
                if attempt == 0 {
                    return Duration::ZERO;
                }
                let multiplier = base.powi(attempt as i32 - 1);
                let nanos = self.initial_delay.as_nanos() as f64 * multiplier;
                if nanos.is_finite() && nanos < u64::MAX as f64 {
                    Duration::from_nanos(nanos as u64)
                } else {
                    self.max_delay
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(strategy: BackoffStrategy, max: Duration) -> BackoffCalculator {
        BackoffCalculator::new(strategy, Duration::from_millis(100), max)
    }

    #[test]
    fn test_fixed_backoff() {
        let calc = calc(BackoffStrategy::Fixed, Duration::from_secs(1));
        assert_eq!(calc.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(calc.calculate_delay(10), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_backoff() {
        let calc = calc(
            BackoffStrategy::Exponential { base: 2.0 },
            Duration::from_millis(500),
        );
        assert_eq!(calc.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(calc.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(calc.calculate_delay(4), Duration::from_millis(500));
        assert_eq!(calc.calculate_delay(200), Duration::from_millis(500));
    }
}
