//! # Jitter for respawn delays.
//!
//! Adds randomness to backoff delays so that multiple pools (or multiple
//! processes on one host) recovering from the same outage do not hammer the
//! system in lockstep.
//!
//! - [`JitterPolicy::None`] exact delays, predictable (good for tests)
//! - [`JitterPolicy::Full`] random delay in `[0, d]`
//! - [`JitterPolicy::Equal`] `d/2 + random[0, d/2]` (balanced default choice)

use std::time::Duration;

use rand::Rng;

/// Policy controlling randomization of respawn delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use the exact computed delay.
    None,
    /// Full jitter: random delay in `[0, delay]`.
    Full,
    /// Equal jitter: `delay/2 + random[0, delay/2]`, preserves ~75% of the
    /// delay on average.
    Equal,
}

impl Default for JitterPolicy {
    fn default() -> Self {
        JitterPolicy::None
    }
}

impl JitterPolicy {
    /// Applies this jitter policy to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
        }
    }
}

/// Random in `[0, delay]`.
fn full_jitter(delay: Duration) -> Duration {
    let ms = (delay.as_millis().min(u128::from(u64::MAX))) as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(0..=ms))
}

/// `delay/2 + random[0, delay/2]`.
fn equal_jitter(delay: Duration) -> Duration {
    let ms = (delay.as_millis().min(u128::from(u64::MAX))) as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let mut rng = rand::rng();
    let jitter = if half == 0 {
        0
    } else {
        rng.random_range(0..=half)
    };
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(250);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn full_stays_within_bounds() {
        let d = Duration::from_millis(100);
        for _ in 0..64 {
            assert!(JitterPolicy::Full.apply(d) <= d);
        }
    }

    #[test]
    fn equal_keeps_at_least_half() {
        let d = Duration::from_millis(100);
        for _ in 0..64 {
            let j = JitterPolicy::Equal.apply(d);
            assert!(j >= d / 2 && j <= d);
        }
    }
}
