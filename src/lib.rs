//! # nix-remote
//!
//! **nix-remote** runs a command with Nix remote builders configured. On macOS
//! it first brings up the `nixpkgs#darwin.linux-builder` VM, waits until the VM
//! answers over SSH, and tears it down once the command is done.
//!
//! The library half is two reusable pieces plus the glue around them:
//! - a **backoff controller** ([`BackoffPolicy`] / [`Backoff`]) handing out
//!   retry slots with multiplicative delays and an overall deadline;
//! - an **agent supervisor** ([`Supervisor`]) that launches a process, probes
//!   it on every slot, and guarantees the process is released on every exit path.
//!
//! ## Architecture
//! ```text
//!  builders.toml ──► Config ──► Vec<Builder> ──┐
//!                                              ├──► NIX_CONFIG ──► user command
//!  (macOS) Builder::darwin_builder() ──────────┘         ▲
//!                                                         │ runs inside
//!  Supervisor::with_agent(cwd, LaunchSpec, token, f) ─────┘
//!     │
//!     ├─► Launcher::launch ──► ProcessGuard (owns AgentProcess)
//!     ├─► loop { Backoff::next ─► Probe::probe ─► try_wait }
//!     ├─► f(AgentHandle)
//!     └─► release: SIGTERM ─► grace ─► SIGKILL
//!
//!  every step ──► Bus (broadcast) ──► listener ──► SubscriberSet ──► LogWriter / custom
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                         |
//! |-------------------|-------------------------------------------------------------|--------------------------------------------|
//! | **Backoff**       | Retry slots with growth, ceiling, deadline and jitter.      | [`BackoffPolicy`], [`Backoff`], [`Attempt`] |
//! | **Supervision**   | Scoped bring-up with guaranteed teardown.                   | [`Supervisor`], [`RunningAgent`]           |
//! | **Seams**         | Replaceable process spawning and readiness probing.         | [`Launcher`], [`AgentProcess`], [`Probe`]  |
//! | **Subscriber API**| Observe bring-up and teardown events.                       | [`Subscribe`], [`Event`], [`LogWriter`]    |
//! | **Builders**      | `builders.toml` loading and machine-spec rendering.         | [`Builder`], [`Config`], [`ConfigFile`]    |
//! | **Errors**        | Typed errors per concern.                                   | [`BringUpError`], [`ConfigError`]          |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use nix_remote::{LaunchSpec, LogWriter, Subscribe, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let dir = tempfile::tempdir()?;
//!     let spec = LaunchSpec::darwin_builder(dir.path());
//!     let token = CancellationToken::new();
//!
//!     let host = sup
//!         .with_agent(dir.path(), &spec, &token, |agent| async move {
//!             Ok::<_, anyhow::Error>(agent.target_address().to_owned())
//!         })
//!         .await?;
//!     println!("built on {host}");
//!
//!     sup.close().await;
//!     Ok(())
//! }
//! ```

mod agent;
mod app;
mod builder;
mod cli;
mod config;
mod error;
mod events;
mod policies;
mod privilege;
mod shutdown;
mod subscribers;

// ---- Public re-exports ----

pub use agent::{
    AgentHandle, AgentProcess, CommandLauncher, CommandProcess, LaunchSpec, Launcher, Probe,
    ProcessExit, RunningAgent, SshProbe, Supervisor, SupervisorBuilder, SupervisorConfig,
};
pub use app::App;
pub use builder::{Builder, DARWIN_BUILDER_HOST, PublicKey, machines, nix_config, ssh_destination};
pub use cli::Cli;
pub use config::{Config, ConfigFile};
pub use error::{
    BackoffTimeout, BringUpError, ConfigError, PolicyError, PrivilegeError, ProbeFailure,
};
pub use events::{Bus, Event, EventKind};
pub use policies::{Attempt, Backoff, BackoffPolicy, Delays, JitterPolicy};
pub use privilege::PrivilegeCheck;
pub use shutdown::wait_for_shutdown_signal;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
