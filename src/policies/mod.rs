//! Retry policies.
//!
//! This module groups the knobs that control **how long** to wait between
//! attempts and **when** to give up.
//!
//! ## Contents
//! - [`BackoffPolicy`] the retry schedule (initial / factor / max delay + overall deadline)
//! - [`Backoff`]       one run of a policy, handing out [`Attempt`] slots
//! - [`JitterPolicy`]  randomization of the sleeps between slots
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { backoff: BackoffPolicy, .. }
//!      └─► agent::Supervisor::bring_up:
//!           let mut run = backoff.begin();
//!           loop { run.next().await?; probe; liveness check }
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → initial=100ms, factor=1.2, max_delay=5s, max_time=60s, jitter=None.

mod backoff;
mod jitter;

pub use backoff::{Attempt, Backoff, BackoffPolicy, Delays};
pub use jitter::JitterPolicy;
