//! # LogWriter: events to `tracing`
//!
//! Maps every [`Event`] onto a structured `tracing` record. Expected noise
//! (failed probes while the agent boots, backoff scheduling) is logged at
//! `trace`; lifecycle milestones at `info`; fatal outcomes at `error`.
//!
//! ## Example output (`--log trace`)
//! ```text
//! INFO  agent="linux-builder" command="nix run nixpkgs#darwin.linux-builder" Starting agent
//! INFO  agent="linux-builder" pid=4242 Agent launched
//! TRACE agent="linux-builder" attempt=1 reason="ssh: connect to host linux-builder port 22: Connection refused" Probe failed
//! TRACE agent="linux-builder" attempt=1 delay_ms=100 elapsed_ms=12 Retrying
//! INFO  agent="linux-builder" attempt=14 elapsed_ms=9120 Agent is reachable
//! INFO  agent="linux-builder" pid=4242 Killing agent
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that forwards events to `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let agent = e.agent.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::AgentStarting => {
                tracing::info!(agent, command = reason, "Starting agent");
            }
            EventKind::AgentLaunched => {
                tracing::info!(agent, pid = ?e.pid, "Agent launched");
            }
            EventKind::ProbeFailed => {
                tracing::trace!(agent, attempt = ?e.attempt, reason, "Probe failed");
            }
            EventKind::BackoffScheduled => {
                tracing::trace!(
                    agent,
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    elapsed_ms = ?e.elapsed_ms,
                    "Retrying"
                );
            }
            EventKind::AgentReady => {
                tracing::info!(agent, attempt = ?e.attempt, elapsed_ms = ?e.elapsed_ms, "Agent is reachable");
            }
            EventKind::AgentExited => {
                tracing::error!(agent, attempt = ?e.attempt, exit_code = ?e.exit_code, "Agent exited during bring-up");
            }
            EventKind::BringUpTimedOut => {
                tracing::error!(agent, attempt = ?e.attempt, timeout_ms = ?e.timeout_ms, "Failed to start agent");
            }
            EventKind::BringUpCancelled => {
                tracing::warn!(agent, "Bring-up cancelled");
            }
            EventKind::AgentTerminating => {
                tracing::info!(agent, pid = ?e.pid, "Killing agent");
            }
            EventKind::AgentKilled => {
                tracing::warn!(agent, pid = ?e.pid, reason, "Agent force-killed");
            }
            EventKind::AgentStopped => {
                tracing::debug!(agent, pid = ?e.pid, exit_code = ?e.exit_code, "Agent stopped");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = agent, reason, "Subscriber dropped an event");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(subscriber = agent, reason, "Subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
