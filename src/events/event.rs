//! # Lifecycle events emitted during agent bring-up.
//!
//! The [`EventKind`] enum classifies event types:
//! - **Bring-up events**: launch, probe attempts, readiness, early exit, timeout
//! - **Cleanup events**: termination, forced kill, final stop
//! - **Subscriber events**: overflow and panics inside the fan-out workers
//!
//! The [`Event`] struct carries the optional metadata (agent name, attempt,
//! delays, exit code, reasons).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use nix_remote::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ProbeFailed)
//!     .with_agent("linux-builder")
//!     .with_attempt(3)
//!     .with_reason("Connection refused");
//!
//! assert_eq!(ev.kind, EventKind::ProbeFailed);
//! assert_eq!(ev.agent.as_deref(), Some("linux-builder"));
//! assert_eq!(ev.attempt, Some(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of bring-up events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `agent` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `agent` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Bring-up events ===
    /// The agent process is about to be launched.
    ///
    /// Sets: `agent`, `reason` (command line).
    AgentStarting,

    /// The agent process was spawned.
    ///
    /// Sets: `agent`, `pid`.
    AgentLaunched,

    /// A readiness probe did not succeed.
    ///
    /// Sets: `agent`, `attempt`, `reason` (probe diagnostic).
    ProbeFailed,

    /// The next probe has been scheduled.
    ///
    /// Sets: `agent`, `attempt` (previous attempt), `delay_ms`, `elapsed_ms`.
    ///
    /// `delay_ms` is the base delay of the policy. With jitter enabled the
    /// actual sleep is a randomized value of at most `delay_ms`.
    BackoffScheduled,

    /// A probe succeeded; the agent is handed to the caller.
    ///
    /// Sets: `agent`, `attempt`, `elapsed_ms`.
    AgentReady,

    /// The agent process exited during bring-up.
    ///
    /// Sets: `agent`, `attempt`, `exit_code` (if it exited normally).
    AgentExited,

    /// The bring-up deadline elapsed.
    ///
    /// Sets: `agent`, `attempt`, `timeout_ms`.
    BringUpTimedOut,

    /// The bring-up was cancelled by its caller.
    ///
    /// Sets: `agent`.
    BringUpCancelled,

    // === Cleanup events ===
    /// The agent process is being shut down gracefully.
    ///
    /// Sets: `agent`, `pid`.
    AgentTerminating,

    /// The agent process was force-killed.
    ///
    /// Sets: `agent`, `pid`, `reason` (why graceful shutdown was skipped or failed).
    AgentKilled,

    /// The agent process is gone.
    ///
    /// Sets: `agent`, `pid`, `exit_code` (if known).
    AgentStopped,
}

/// Bring-up event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the agent (or subscriber), if applicable.
    pub agent: Option<Arc<str>>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
    /// OS process id of the agent.
    pub pid: Option<u32>,
    /// Exit code of the agent, if it exited normally.
    pub exit_code: Option<i32>,
    /// Delay before the next attempt in milliseconds, before jitter is applied.
    pub delay_ms: Option<u32>,
    /// Time since the first attempt in milliseconds.
    pub elapsed_ms: Option<u32>,
    /// Bring-up budget in milliseconds.
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (diagnostics, commands, etc.).
    pub reason: Option<Arc<str>>,
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            agent: None,
            attempt: None,
            pid: None,
            exit_code: None,
            delay_ms: None,
            elapsed_ms: None,
            timeout_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_agent(mut self, agent: impl Into<Arc<str>>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a process id; `None` leaves the field unset.
    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Attaches an exit code; `None` (killed by a signal) leaves the field unset.
    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(compact_ms(d));
        self
    }

    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_agent(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_agent(subscriber)
            .with_reason(info)
    }
}
