//! # Process guard: release on every exit path.
//!
//! [`ProcessGuard`] owns the agent process for the whole bring-up and for the
//! caller's use of the agent afterwards.
//!
//! ```text
//! release().await ──► AgentTerminating ──► terminate() ──► wait ≤ grace ──► AgentStopped
//!                                               │ error         │ timeout
//!                                               └──────► AgentKilled ──► kill() ──► wait ≤ grace
//!
//! drop (no release) ──► kill() ──► AgentKilled
//! ```
//!
//! ## Rules
//! - Release runs at most once; later calls do nothing.
//! - The process stays owned until release completes, so a release that is itself
//!   cancelled still ends in the synchronous kill of `Drop`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::agent::{AgentProcess, ProcessExit};
use crate::events::{Bus, Event, EventKind};

pub(crate) struct ProcessGuard {
    process: Option<Box<dyn AgentProcess>>,
    agent: Arc<str>,
    pid: Option<u32>,
    exit: Option<ProcessExit>,
    bus: Bus,
    grace: Duration,
}

impl ProcessGuard {
    pub(crate) fn new(
        process: Box<dyn AgentProcess>,
        agent: Arc<str>,
        bus: Bus,
        grace: Duration,
    ) -> Self {
        let pid = process.id();
        Self {
            process: Some(process),
            agent,
            pid,
            exit: None,
            bus,
            grace,
        }
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// How the process ended, once that is known.
    pub(crate) fn exit(&self) -> Option<ProcessExit> {
        self.exit
    }

    /// Non-blocking exit check. Remembers the first observed exit.
    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let Some(process) = self.process.as_mut() else {
            return Ok(None);
        };
        self.exit = process.try_wait()?;
        Ok(self.exit)
    }

    /// Terminates the process, escalating to a kill after the grace period.
    pub(crate) async fn release(&mut self) {
        let Some(process) = self.process.as_mut() else {
            return;
        };
        self.bus.publish(
            Event::new(EventKind::AgentTerminating)
                .with_agent(self.agent.clone())
                .with_pid(self.pid),
        );

        let graceful = match process.terminate() {
            Ok(()) => match time::timeout(self.grace, process.wait()).await {
                Ok(Ok(exit)) => Ok(exit),
                Ok(Err(e)) => Err(format!("wait failed: {e}")),
                Err(_) => Err(format!("still running after {:?}", self.grace)),
            },
            Err(e) => Err(format!("terminate failed: {e}")),
        };

        let exit = match graceful {
            Ok(exit) => Some(exit),
            Err(reason) => {
                self.bus.publish(
                    Event::new(EventKind::AgentKilled)
                        .with_agent(self.agent.clone())
                        .with_pid(self.pid)
                        .with_reason(reason),
                );
                if let Err(e) = process.kill() {
                    tracing::warn!(agent = %self.agent, pid = ?self.pid, error = %e, "Failed to kill agent");
                }
                time::timeout(self.grace, process.wait())
                    .await
                    .ok()
                    .and_then(Result::ok)
            }
        };

        self.process = None;
        self.exit = self.exit.or(exit);
        self.bus.publish(
            Event::new(EventKind::AgentStopped)
                .with_agent(self.agent.clone())
                .with_pid(self.pid)
                .with_exit_code(self.exit.and_then(|exit| exit.code)),
        );
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            self.bus.publish(
                Event::new(EventKind::AgentKilled)
                    .with_agent(self.agent.clone())
                    .with_pid(self.pid)
                    .with_reason("dropped without shutdown"),
            );
        }
    }
}
