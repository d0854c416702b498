//! Error types used by the backoff controller, the agent supervisor and the
//! configuration collaborators.
//!
//! - [`BackoffTimeout`] ends a retry sequence once its deadline has passed.
//! - [`PolicyError`] rejects a [`BackoffPolicy`](crate::BackoffPolicy) that violates its invariants.
//! - [`ProbeFailure`] is a transient readiness-probe failure, absorbed by the retry loop.
//! - [`BringUpError`] is raised by the [`Supervisor`](crate::Supervisor) while starting an agent.
//! - [`ConfigError`] and [`PrivilegeError`] are raised before any process is started.
//!
//! Every enum provides `as_label` for use as a stable field in logs.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::agent::ProcessExit;

/// The retry sequence exceeded its configured wall-clock budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("max time {max_time:?} exceeded")]
pub struct BackoffTimeout {
    /// The configured `max_time` of the policy that ran out.
    pub max_time: Duration,
}

/// A [`BackoffPolicy`](crate::BackoffPolicy) that cannot drive a retry sequence.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("initial delay must be greater than zero")]
    ZeroInitialDelay,

    #[error("factor must be greater than 1.0, got {factor}")]
    FactorTooSmall { factor: f64 },

    #[error("max delay {max_delay:?} is below the initial delay {initial_delay:?}")]
    MaxBelowInitial {
        initial_delay: Duration,
        max_delay: Duration,
    },
}

/// A single readiness probe did not succeed.
///
/// Expected while the agent is still booting; the supervisor publishes it as an
/// event and moves on to the next attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("probe failed: {diagnostic}")]
pub struct ProbeFailure {
    /// Short diagnostic, usually the trimmed stderr of the probe command.
    pub diagnostic: String,
}

impl ProbeFailure {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }

    pub(crate) fn timed_out(after: Duration) -> Self {
        Self::new(format!("no answer within {after:?}"))
    }
}

/// # Errors produced while bringing up an agent.
///
/// Whenever the agent process was started, it has been torn down by the time
/// one of these is returned.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BringUpError {
    /// The agent process died before a probe succeeded.
    #[error("{agent} exited before it became reachable ({exit})")]
    ProcessExitedEarly { agent: String, exit: ProcessExit },

    /// The backoff deadline elapsed without a successful probe.
    #[error("{agent} was not reachable within {max_time:?}")]
    BringUpTimedOut { agent: String, max_time: Duration },

    /// The caller's cancellation token fired during bring-up.
    #[error("bring-up of {agent} was cancelled")]
    Cancelled { agent: String },

    /// The agent process could not be started at all.
    #[error("failed to launch {agent}: {source}")]
    Spawn {
        agent: String,
        #[source]
        source: io::Error,
    },

    /// Polling the agent process for its exit status failed.
    #[error("failed to poll {agent}: {source}")]
    Poll {
        agent: String,
        #[source]
        source: io::Error,
    },

    /// Another bring-up already owns this supervisor.
    #[error("a bring-up is already in flight on this supervisor")]
    Busy,

    /// The configured backoff policy violates its invariants. Nothing was launched.
    #[error("invalid backoff policy: {0}")]
    Policy(#[from] PolicyError),
}

impl BringUpError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use nix_remote::BringUpError;
    /// use std::time::Duration;
    ///
    /// let err = BringUpError::BringUpTimedOut { agent: "vm".into(), max_time: Duration::from_secs(60) };
    /// assert_eq!(err.as_label(), "bring_up_timed_out");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BringUpError::ProcessExitedEarly { .. } => "process_exited_early",
            BringUpError::BringUpTimedOut { .. } => "bring_up_timed_out",
            BringUpError::Cancelled { .. } => "bring_up_cancelled",
            BringUpError::Spawn { .. } => "spawn_failed",
            BringUpError::Poll { .. } => "poll_failed",
            BringUpError::Busy => "bring_up_busy",
            BringUpError::Policy(_) => "invalid_policy",
        }
    }
}

/// # Errors produced while reading or writing the builders file.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read public key {}: {source}", path.display())]
    PublicKey {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("cannot locate the configuration directory; set XDG_CONFIG_HOME or HOME")]
    NoConfigDir,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::PublicKey { .. } => "config_public_key",
            ConfigError::Write { .. } => "config_write",
            ConfigError::AlreadyExists { .. } => "config_exists",
            ConfigError::NoConfigDir => "config_no_dir",
        }
    }
}

/// # Errors produced by the elevated-privilege check.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PrivilegeError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed with {status}")]
    Denied { command: String, status: ExitStatus },

    #[error("nix-remote requires root privileges, but `{command}` reported {user:?}")]
    NotRoot { command: String, user: String },
}

impl PrivilegeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PrivilegeError::Spawn { .. } => "privilege_spawn",
            PrivilegeError::Denied { .. } => "privilege_denied",
            PrivilegeError::NotRoot { .. } => "privilege_not_root",
        }
    }
}
