//! # Supervisor: brings up one agent and tears it down on every exit path.
//!
//! The [`Supervisor`] owns the event bus, the launch and probe seams, and a
//! single in-flight permit. [`Supervisor::with_agent`] is the scoped form:
//! the closure only runs once the agent answers a probe, and the agent is
//! terminated when the closure returns, whatever it returns.
//!
//! ## Bring-up
//! ```text
//! backoff.validate() ──(invalid)──► Err(Policy)
//!        │
//! try_acquire permit ──(taken)──► Err(Busy)
//!        │
//!        ▼
//! publish AgentStarting ─► launcher.launch(spec, cwd) ─► publish AgentLaunched
//!        │
//!        ▼
//! loop {
//!   ├─► backoff.next()            (cancellable; Err → BringUpTimedOut)
//!   ├─► probe(target, credential) (cancellable, bounded by probe_timeout)
//!   │       └─ Err → publish ProbeFailed
//!   ├─► process.try_wait()
//!   │       └─ exited → publish AgentExited, Err(ProcessExitedEarly)
//!   ├─► probe Ok → publish AgentReady, hand out RunningAgent
//!   └─► publish BackoffScheduled
//! }
//! on Err: guard.release() before returning
//! ```
//!
//! ## Rules
//! - Probe and liveness check run **sequentially** within a slot; slots never overlap.
//! - A failed probe is never an error by itself; only exit, timeout or cancellation end the loop.
//! - One bring-up per supervisor at a time; the permit is held until the agent is released.
//!
//! ## Example
//! ```rust,no_run
//! use nix_remote::{LaunchSpec, Supervisor, SupervisorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let spec = LaunchSpec::darwin_builder(dir.path());
//! let sup = Supervisor::builder(SupervisorConfig::default()).build();
//!
//! let token = CancellationToken::new();
//! sup.with_agent(dir.path(), &spec, &token, |agent| async move {
//!     println!("{} is up (pid {:?})", agent.name(), agent.pid());
//!     Ok::<_, anyhow::Error>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::agent::guard::ProcessGuard;
use crate::agent::{
    CommandLauncher, Launcher, LaunchSpec, Probe, ProcessExit, SshProbe, SupervisorConfig,
};
use crate::error::{BringUpError, ProbeFailure};
use crate::events::{Bus, Event, EventKind};
use crate::policies::Attempt;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Supervisor`] with custom seams and subscribers.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    launcher: Arc<dyn Launcher>,
    probe: Arc<dyn Probe>,
}

impl SupervisorBuilder {
    /// Creates a builder using [`CommandLauncher`] and [`SshProbe`].
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            launcher: Arc::new(CommandLauncher),
            probe: Arc::new(SshProbe::default()),
        }
    }

    /// Sets event subscribers; each gets its own worker and bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    /// Builds the supervisor.
    ///
    /// Must be called from within a tokio runtime when subscribers are set.
    pub fn build(self) -> Supervisor {
        let bus = Bus::new(self.cfg.bus_capacity);
        let closing = CancellationToken::new();

        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            Some(spawn_listener(&bus, set, closing.clone()))
        };

        Supervisor {
            cfg: self.cfg,
            bus,
            launcher: self.launcher,
            probe: self.probe,
            in_flight: Arc::new(Semaphore::new(1)),
            listener,
            closing,
        }
    }
}

/// Forwards bus events to the subscriber set until the supervisor closes.
fn spawn_listener(bus: &Bus, set: SubscriberSet, closing: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                res = rx.recv() => match res {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = closing.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => set.emit(&ev),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    })
}

/// Read-only view of a running, verified-reachable agent.
#[derive(Clone, Debug)]
pub struct AgentHandle {
    name: Arc<str>,
    pid: Option<u32>,
    target_address: String,
    credential_path: PathBuf,
    attempts: u32,
    elapsed: Duration,
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn target_address(&self) -> &str {
        &self.target_address
    }

    pub fn credential_path(&self) -> &Path {
        &self.credential_path
    }

    /// Attempt on which the probe first succeeded.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time from the first probe to the successful one.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// A reachable agent whose process is owned by this value.
///
/// Call [`RunningAgent::shutdown`] to release it gracefully. Dropping it
/// instead kills the process immediately.
pub struct RunningAgent {
    handle: AgentHandle,
    guard: ProcessGuard,
    _permit: OwnedSemaphorePermit,
}

impl RunningAgent {
    pub fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    /// Non-blocking liveness check for callers using the agent.
    pub fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        self.guard.try_wait()
    }

    /// Terminates the agent (kill after the grace period) and frees the supervisor.
    pub async fn shutdown(mut self) -> Option<ProcessExit> {
        self.guard.release().await;
        self.guard.exit()
    }
}

/// Brings up agents, one at a time.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    launcher: Arc<dyn Launcher>,
    probe: Arc<dyn Probe>,
    in_flight: Arc<Semaphore>,
    listener: Option<JoinHandle<()>>,
    closing: CancellationToken,
}

impl Supervisor {
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// The bus every bring-up event is published on.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runs `f` against a reachable agent, then tears the agent down.
    ///
    /// The agent is released after `f` completes, whether it returned `Ok` or
    /// `Err`; the caller's error is returned unchanged. Bring-up failures are
    /// converted into `E` and the process, if it was started, is already gone.
    pub async fn with_agent<F, Fut, T, E>(
        &self,
        cwd: &Path,
        spec: &LaunchSpec,
        token: &CancellationToken,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(AgentHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BringUpError>,
    {
        let agent = self.bring_up(cwd, spec, token).await?;
        let result = f(agent.handle().clone()).await;
        agent.shutdown().await;
        result
    }

    /// Launches the agent and waits until it answers a probe.
    ///
    /// ### Errors
    /// - [`BringUpError::Policy`]: `backoff` fails [`BackoffPolicy::validate`](crate::BackoffPolicy::validate);
    /// - [`BringUpError::Busy`]: another agent from this supervisor is still held;
    /// - [`BringUpError::Spawn`]: the process could not be started;
    /// - [`BringUpError::ProcessExitedEarly`]: the process died before a probe succeeded;
    /// - [`BringUpError::BringUpTimedOut`]: `backoff.max_time` elapsed;
    /// - [`BringUpError::Cancelled`]: `token` fired;
    /// - [`BringUpError::Poll`]: the exit status could not be read.
    ///
    /// In every error case after a successful launch, the process has been released.
    pub async fn bring_up(
        &self,
        cwd: &Path,
        spec: &LaunchSpec,
        token: &CancellationToken,
    ) -> Result<RunningAgent, BringUpError> {
        self.cfg.backoff.validate()?;
        let permit = Arc::clone(&self.in_flight)
            .try_acquire_owned()
            .map_err(|_| BringUpError::Busy)?;
        let agent: Arc<str> = Arc::from(spec.name.as_str());

        self.bus.publish(
            Event::new(EventKind::AgentStarting)
                .with_agent(agent.clone())
                .with_reason(spec.command_line()),
        );
        let process = self
            .launcher
            .launch(spec, cwd)
            .map_err(|source| BringUpError::Spawn {
                agent: spec.name.clone(),
                source,
            })?;
        let mut guard = ProcessGuard::new(process, agent.clone(), self.bus.clone(), self.cfg.grace);
        self.bus.publish(
            Event::new(EventKind::AgentLaunched)
                .with_agent(agent.clone())
                .with_pid(guard.pid()),
        );

        match self.await_ready(&mut guard, &agent, spec, token).await {
            Ok(attempt) => Ok(RunningAgent {
                handle: AgentHandle {
                    name: agent,
                    pid: guard.pid(),
                    target_address: spec.target_address.clone(),
                    credential_path: spec.credential_path.clone(),
                    attempts: attempt.number,
                    elapsed: attempt.elapsed,
                },
                guard,
                _permit: permit,
            }),
            Err(err) => {
                guard.release().await;
                Err(err)
            }
        }
    }

    async fn await_ready(
        &self,
        guard: &mut ProcessGuard,
        agent: &Arc<str>,
        spec: &LaunchSpec,
        token: &CancellationToken,
    ) -> Result<Attempt, BringUpError> {
        let mut backoff = self.cfg.backoff.begin();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.cancelled(agent)),
                next = backoff.next() => next,
            };
            let attempt = match next {
                Ok(attempt) => attempt,
                Err(timeout) => {
                    self.bus.publish(
                        Event::new(EventKind::BringUpTimedOut)
                            .with_agent(agent.clone())
                            .with_attempt(backoff.attempts())
                            .with_timeout(timeout.max_time),
                    );
                    return Err(BringUpError::BringUpTimedOut {
                        agent: agent.to_string(),
                        max_time: timeout.max_time,
                    });
                }
            };

            let probe = time::timeout(
                self.cfg.probe_timeout,
                self.probe.probe(&spec.target_address, &spec.credential_path),
            );
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.cancelled(agent)),
                res = probe => res.unwrap_or_else(|_| Err(ProbeFailure::timed_out(self.cfg.probe_timeout))),
            };

            if let Err(failure) = &outcome {
                self.bus.publish(
                    Event::new(EventKind::ProbeFailed)
                        .with_agent(agent.clone())
                        .with_attempt(attempt.number)
                        .with_reason(failure.diagnostic.as_str()),
                );
            }

            match guard.try_wait() {
                Ok(None) => {}
                Ok(Some(exit)) => {
                    self.bus.publish(
                        Event::new(EventKind::AgentExited)
                            .with_agent(agent.clone())
                            .with_attempt(attempt.number)
                            .with_exit_code(exit.code),
                    );
                    return Err(BringUpError::ProcessExitedEarly {
                        agent: agent.to_string(),
                        exit,
                    });
                }
                Err(source) => {
                    return Err(BringUpError::Poll {
                        agent: agent.to_string(),
                        source,
                    });
                }
            }

            if outcome.is_ok() {
                self.bus.publish(
                    Event::new(EventKind::AgentReady)
                        .with_agent(agent.clone())
                        .with_attempt(attempt.number)
                        .with_elapsed(attempt.elapsed),
                );
                return Ok(attempt);
            }

            self.bus.publish(
                Event::new(EventKind::BackoffScheduled)
                    .with_agent(agent.clone())
                    .with_attempt(attempt.number)
                    .with_delay(backoff.current_delay())
                    .with_elapsed(attempt.elapsed),
            );
        }
    }

    fn cancelled(&self, agent: &Arc<str>) -> BringUpError {
        self.bus
            .publish(Event::new(EventKind::BringUpCancelled).with_agent(agent.clone()));
        BringUpError::Cancelled {
            agent: agent.to_string(),
        }
    }

    /// Flushes pending events to the subscribers and stops their workers.
    pub async fn close(mut self) {
        self.closing.cancel();
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.closing.cancel();
    }
}
