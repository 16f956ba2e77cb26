//! Retry policies for transient transport failures

use std::time::Duration;

/// Decides how long to wait before retrying a failed transport call.
///
/// `attempt` counts failures so far, starting at 1. Returning `None` gives
/// up. Plain functions and closures are policies too:
///
/// ```rust
/// use ot_sync::RetryPolicy;
/// use std::time::Duration;
///
/// let twice = |attempt: u32| (attempt <= 2).then_some(Duration::ZERO);
/// assert_eq!(twice.next_delay(1), Some(Duration::ZERO));
/// assert_eq!(twice.next_delay(3), None);
/// ```
pub trait RetryPolicy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

impl<F> RetryPolicy for F
where
    F: Fn(u32) -> Option<Duration> + Send + Sync,
{
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self(attempt)
    }
}

/// Wait the same delay before every retry, optionally a bounded number of times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

    /// Retry forever with `delay` between attempts
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Retry forever without waiting
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Give up once `max_attempts` calls have failed
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_fixed_delay() {
        let policy = FixedDelay::new(Duration::from_millis(250));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.next_delay(10_000), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_bounded_fixed_delay() {
        let policy = FixedDelay::immediate().with_max_attempts(3);
        assert_eq!(policy.next_delay(1), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(2), Some(Duration::ZERO));
        assert_eq!(policy.next_delay(3), None);
    }
}
