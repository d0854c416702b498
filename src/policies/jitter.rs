//! # Jitter for backoff sleeps.
//!
//! [`JitterPolicy`] randomizes the sleep that precedes an attempt. The randomized
//! value is only slept for; the run's `current_delay` keeps growing from the
//! un-jittered base, so jitter never shortens later delays.
//!
//! - [`JitterPolicy::None`]: sleep exactly the base delay (default)
//! - [`JitterPolicy::Full`]: sleep a random duration in `[0, delay]`
//! - [`JitterPolicy::Equal`]: sleep `delay/2 + random[0, delay/2]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied to each backoff sleep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Sleep exactly the computed delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl JitterPolicy {
    /// Returns the duration to actually sleep for `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return delay;
        }
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rand::rng().random_range(0..=half))
            }
        }
    }
}
