//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] centralizes the bring-up tuning:
//! - **Retry schedule**: when to probe again and when to give up ([`BackoffPolicy`])
//! - **Probe bound**: how long a single probe may take
//! - **Teardown**: how long a terminated agent gets before it is killed
//! - **Event system**: bus capacity for event delivery

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Tuning for [`Supervisor`](crate::Supervisor).
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Retry schedule for readiness probes.
    ///
    /// The bring-up fails with `BringUpTimedOut` once `backoff.max_time` has elapsed.
    pub backoff: BackoffPolicy,

    /// Upper bound on a single probe; a probe still running after this counts as failed.
    pub probe_timeout: Duration,

    /// How long a terminated agent may take to exit before it is force-killed.
    ///
    /// `0s` kills as soon as the terminate signal has been sent.
    pub grace: Duration,

    /// Capacity of the event bus ring buffer (min 1; clamped by the bus).
    ///
    /// Subscribers lagging more than this many events skip the older ones.
    pub bus_capacity: usize,
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `backoff = BackoffPolicy::default()` (100ms × 1.2 up to 5s, 60s budget)
    /// - `probe_timeout = 10s`
    /// - `grace = 5s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            probe_timeout: Duration::from_secs(10),
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
        }
    }
}
