//! # Backoff policy for worker respawn attempts.
//!
//! [`BackoffPolicy`] controls how the delay between consecutive failed
//! worker spawns grows. It is parameterized by:
//! - [`BackoffPolicy::first`] the initial delay;
//! - [`BackoffPolicy::max`] the delay cap;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor.
//!
//! The pool resets the backoff state as soon as a worker reaches Ready, so
//! a single transient start failure costs one `first` delay and nothing
//! more.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use taskpool::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(5),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(None), Duration::from_millis(50));
//! assert_eq!(backoff.next(Some(Duration::from_millis(50))), Duration::from_millis(100));
//! // Growth is capped at `max`.
//! assert_eq!(backoff.next(Some(Duration::from_secs(20))), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Respawn backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Initial delay before the first respawn attempt.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied to the computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 50ms`;
    /// - `max = 5s`;
    /// - `factor = 2.0` (exponential);
    /// - no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(50),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the next delay from the previous one.
    ///
    /// - `prev = None` (first failure in a streak) yields `first` clamped to `max`.
    /// - Otherwise the previous delay is multiplied by [`factor`](Self::factor)
    ///   and capped at [`max`](Self::max).
    pub fn next(&self, prev: Option<Duration>) -> Duration {
        let unclamped = match prev {
            None => self.first,
            Some(d) => {
                let grown = d.as_secs_f64() * self.factor;
                if grown.is_finite() {
                    d.mul_f64(self.factor)
                } else {
                    self.max
                }
            }
        };
        self.jitter.apply(unclamped.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delay_is_clamped_to_max() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(2),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(None), Duration::from_secs(2));
    }

    #[test]
    fn delay_grows_by_factor_until_cap() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_millis(350),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        let d1 = policy.next(None);
        let d2 = policy.next(Some(d1));
        let d3 = policy.next(Some(d2));
        assert_eq!(d1, Duration::from_millis(100));
        assert_eq!(d2, Duration::from_millis(200));
        assert_eq!(d3, Duration::from_millis(350));
    }

    #[test]
    fn constant_factor_keeps_delay_flat() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(75),
            max: Duration::from_secs(1),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        let d1 = policy.next(None);
        assert_eq!(policy.next(Some(d1)), d1);
    }
}
