//! # Exponential backoff with an overall deadline.
//!
//! [`BackoffPolicy`] describes the retry schedule, [`Backoff`] is one run of it.
//! A run hands out attempt slots:
//! - slot 1 is yielded immediately, without sleeping;
//! - every later slot is preceded by a sleep of the current delay, after which the
//!   delay is multiplied by [`BackoffPolicy::factor`] and clamped to [`BackoffPolicy::max_delay`];
//! - before sleeping for a slot, the run checks whether more than [`BackoffPolicy::max_time`]
//!   has passed since slot 1 and, if so, ends with [`BackoffTimeout`].
//!
//! The deadline is checked before the sleep, not after it. A run can therefore
//! overshoot `max_time` by up to one full delay before it reports the timeout.
//!
//! ```text
//!  next() ──► Initial ──► capture start, yield slot 1
//!  next() ──► Waiting ──► elapsed > max_time ? ──yes──► Exhausted ──► Err(BackoffTimeout)
//!                                  │no
//!                                  ▼
//!                     sleep(current_delay) ─► grow delay ─► yield slot n
//! ```
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use nix_remote::{BackoffPolicy, JitterPolicy};
//!
//! let policy = BackoffPolicy {
//!     initial_delay: Duration::from_millis(100),
//!     max_delay: Duration::from_millis(300),
//!     max_time: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! let delays: Vec<_> = policy.delays().take(4).collect();
//! assert_eq!(delays, [
//!     Duration::from_millis(100),
//!     Duration::from_millis(200),
//!     Duration::from_millis(300),
//!     Duration::from_millis(300),
//! ]);
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};

use crate::error::{BackoffTimeout, PolicyError};
use crate::policies::jitter::JitterPolicy;

/// Retry schedule for a caller-driven retry loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling any single delay may grow to.
    pub max_delay: Duration,
    /// Total budget, measured from the first attempt.
    pub max_time: Duration,
    /// Multiplier applied to the delay after every attempt (`> 1.0`).
    pub factor: f64,
    /// Randomization applied to each sleep. Never feeds back into the delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns the bring-up tuning:
    /// - `initial_delay = 100ms`;
    /// - `max_delay = 5s`;
    /// - `max_time = 60s`;
    /// - `factor = 1.2`.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_time: Duration::from_secs(60),
            factor: 1.2,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Checks `initial_delay > 0`, `factor > 1.0` and `max_delay >= initial_delay`.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.initial_delay.is_zero() {
            return Err(PolicyError::ZeroInitialDelay);
        }
        if !(self.factor > 1.0) {
            return Err(PolicyError::FactorTooSmall {
                factor: self.factor,
            });
        }
        if self.max_delay < self.initial_delay {
            return Err(PolicyError::MaxBelowInitial {
                initial_delay: self.initial_delay,
                max_delay: self.max_delay,
            });
        }
        Ok(())
    }

    /// Starts a new retry sequence. The clock starts on the first [`Backoff::next`].
    pub fn begin(&self) -> Backoff {
        Backoff {
            policy: *self,
            current_delay: self.initial_delay.min(self.max_delay),
            attempt: 0,
            state: State::Initial,
        }
    }

    /// The un-jittered delays a run sleeps for, in order, without sleeping.
    pub fn delays(&self) -> Delays {
        Delays {
            policy: *self,
            current: self.initial_delay.min(self.max_delay),
        }
    }

    /// Grows `delay` by one round: `delay × factor`, clamped to `max_delay`.
    fn grow(&self, delay: Duration) -> Duration {
        let secs = delay.as_secs_f64() * self.factor;
        if !secs.is_finite() || secs < 0.0 || secs > self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Infinite iterator over the base delays of a policy.
#[derive(Clone, Debug)]
pub struct Delays {
    policy: BackoffPolicy,
    current: Duration,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current;
        self.current = self.policy.grow(delay);
        Some(delay)
    }
}

/// One attempt slot handed out by [`Backoff::next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Time since the first attempt.
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug)]
enum State {
    Initial,
    Waiting { start: Instant },
    Exhausted,
}

/// A single run of a [`BackoffPolicy`].
///
/// Holds no resources: dropping it mid-sequence needs no cleanup.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current_delay: Duration,
    attempt: u32,
    state: State,
}

impl Backoff {
    /// Waits for and returns the next attempt slot.
    ///
    /// Returns [`BackoffTimeout`] once the deadline has passed; every call after
    /// that returns the same error.
    ///
    /// Cancel-safe: dropping the future during its sleep leaves the run as it was.
    pub async fn next(&mut self) -> Result<Attempt, BackoffTimeout> {
        match self.state {
            State::Initial => {
                self.state = State::Waiting {
                    start: Instant::now(),
                };
                self.attempt = 1;
                Ok(Attempt {
                    number: 1,
                    elapsed: Duration::ZERO,
                })
            }
            State::Waiting { start } => {
                if start.elapsed() > self.policy.max_time {
                    self.state = State::Exhausted;
                    return Err(self.timeout());
                }

                let delay = self.current_delay;
                time::sleep(self.policy.jitter.apply(delay)).await;

                self.current_delay = self.policy.grow(delay);
                self.attempt += 1;
                Ok(Attempt {
                    number: self.attempt,
                    elapsed: start.elapsed(),
                })
            }
            State::Exhausted => Err(self.timeout()),
        }
    }

    /// The delay that precedes the next slot.
    #[inline]
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Number of slots handed out so far.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// The policy this run follows.
    #[inline]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn timeout(&self) -> BackoffTimeout {
        BackoffTimeout {
            max_time: self.policy.max_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, max_ms: u64, max_time_ms: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            max_time: Duration::from_millis(max_time_ms),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_default_tuning() {
        let p = BackoffPolicy::default();
        assert_eq!(p.initial_delay, Duration::from_millis(100));
        assert_eq!(p.max_delay, Duration::from_secs(5));
        assert_eq!(p.max_time, Duration::from_secs(60));
        assert_eq!(p.factor, 1.2);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        assert_eq!(
            policy(0, 100, 1000, 2.0).validate(),
            Err(PolicyError::ZeroInitialDelay)
        );
        assert_eq!(
            policy(10, 100, 1000, 1.0).validate(),
            Err(PolicyError::FactorTooSmall { factor: 1.0 })
        );
        assert!(matches!(
            policy(10, 100, 1000, f64::NAN).validate(),
            Err(PolicyError::FactorTooSmall { .. })
        ));
        assert!(matches!(
            policy(100, 10, 1000, 2.0).validate(),
            Err(PolicyError::MaxBelowInitial { .. })
        ));
    }

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        for initial in [1, 10, 50, 100, 999] {
            for max in [initial, initial * 3, 5_000] {
                for factor in [1.01, 1.2, 2.0, 10.0, 1e6] {
                    let p = policy(initial, max, 60_000, factor);
                    let delays: Vec<_> = p.delays().take(2_000).collect();

                    assert_eq!(delays[0], Duration::from_millis(initial));
                    for pair in delays.windows(2) {
                        assert!(pair[0] <= pair[1], "{p:?}: {pair:?} decreased");
                    }
                    for d in &delays {
                        assert!(*d <= p.max_delay, "{p:?}: {d:?} above cap");
                    }
                    assert_eq!(*delays.last().unwrap(), p.max_delay);
                }
            }
        }
    }

    #[test]
    fn test_delays_grow_by_factor() {
        let p = policy(100, 10_000, 60_000, 2.0);
        let delays: Vec<_> = p.delays().take(4).collect();
        assert_eq!(
            delays,
            [
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_slot_is_immediate() {
        let mut run = policy(100, 1_000, 10_000, 2.0).begin();
        let before = Instant::now();

        let slot = run.next().await.unwrap();
        assert_eq!(slot.number, 1);
        assert_eq!(slot.elapsed, Duration::ZERO);
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_slots_sleep_current_delay() {
        let mut run = policy(100, 10_000, 60_000, 2.0).begin();
        let start = Instant::now();

        run.next().await.unwrap();
        assert_eq!(run.current_delay(), Duration::from_millis(100));

        let second = run.next().await.unwrap();
        assert_eq!(second.number, 2);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert_eq!(run.current_delay(), Duration::from_millis(200));

        let third = run.next().await.unwrap();
        assert_eq!(third.number, 3);
        assert_eq!(third.elapsed, Duration::from_millis(300));
        assert_eq!(run.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_time_never_fails_first_slot() {
        let mut run = policy(10, 100, 0, 2.0).begin();

        assert!(run.next().await.is_ok());
        // No time has passed yet, so the deadline is not exceeded.
        assert!(run.next().await.is_ok());
        assert_eq!(
            run.next().await,
            Err(BackoffTimeout {
                max_time: Duration::ZERO
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_checked_before_sleep() {
        // Slots at 0, 50, 110, 182 and 268.4ms; the check at 268.4ms fails.
        let p = policy(50, 5_000, 200, 1.2);
        let mut run = p.begin();
        let start = Instant::now();

        let mut slots = 0;
        let err = loop {
            match run.next().await {
                Ok(_) => slots += 1,
                Err(e) => break e,
            }
        };

        assert_eq!(slots, 5);
        assert_eq!(err.max_time, p.max_time);
        let elapsed = start.elapsed();
        assert!(elapsed > p.max_time);
        assert!(elapsed <= p.max_time + run.current_delay());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_stays_exhausted() {
        let mut run = policy(10, 10, 5, 2.0).begin();
        while run.next().await.is_ok() {}

        let before = Instant::now();
        assert!(run.next().await.is_err());
        assert!(run.next().await.is_err());
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_are_independent() {
        let p = policy(100, 1_000, 10_000, 2.0);
        let mut a = p.begin();
        let mut b = p.begin();

        a.next().await.unwrap();
        a.next().await.unwrap();
        b.next().await.unwrap();

        assert_eq!(a.current_delay(), Duration::from_millis(200));
        assert_eq!(b.current_delay(), Duration::from_millis(100));
    }
}
