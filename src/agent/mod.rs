//! Agent supervision: launch, readiness probing, teardown.
//!
//! ## Contents
//! - [`LaunchSpec`], [`Launcher`], [`AgentProcess`] what to run and the spawn seam
//! - [`Probe`], [`SshProbe`] one readiness check against the running agent
//! - [`SupervisorConfig`] backoff, probe bound and teardown grace
//! - [`Supervisor`], [`RunningAgent`], [`AgentHandle`] the bring-up itself and its result
//!
//! ## Quick wiring
//! ```text
//! Supervisor::with_agent(cwd, spec, token, f)
//!      ├─► bring_up: launch ─► backoff slots ─► probe + try_wait
//!      ├─► f(AgentHandle)
//!      └─► RunningAgent::shutdown: terminate ─► grace ─► kill
//! ```

mod config;
mod guard;
mod probe;
mod process;
mod supervisor;

pub use config::SupervisorConfig;
pub use probe::{Probe, SshProbe};
pub use process::{AgentProcess, CommandLauncher, CommandProcess, LaunchSpec, Launcher, ProcessExit};
pub use supervisor::{AgentHandle, RunningAgent, Supervisor, SupervisorBuilder};
