//! # Process launch interface.
//!
//! The supervisor never touches `tokio::process` directly. It goes through two
//! seams:
//! - [`Launcher`] spawns the agent described by a [`LaunchSpec`] in a working directory;
//! - [`AgentProcess`] is the spawned process: non-blocking exit polling, graceful
//!   termination, forceful kill, and an async wait used while tearing it down.
//!
//! [`CommandLauncher`] / [`CommandProcess`] are the real implementations. Tests
//! substitute scripted fakes.
//!
//! ## Signals
//! - `terminate()` sends `SIGTERM` on unix (a forceful kill elsewhere).
//! - `kill()` sends `SIGKILL`.
//! - Both succeed without doing anything once the process has exited.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::builder::{DARWIN_BUILDER_HOST, ssh_destination};

/// How an agent process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn with_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("killed by a signal"),
        }
    }
}

/// What to run, and how to tell when it is ready.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Display name used in events and errors.
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Where the readiness probe connects to.
    pub target_address: String,
    /// Private key the readiness probe authenticates with.
    pub credential_path: PathBuf,
}

impl LaunchSpec {
    /// The installable that provides the darwin linux-builder VM.
    pub const DARWIN_BUILDER_INSTALLABLE: &str = "nixpkgs#darwin.linux-builder";

    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            target_address: String::new(),
            credential_path: PathBuf::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn target(mut self, address: impl Into<String>) -> Self {
        self.target_address = address.into();
        self
    }

    pub fn credential(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_path = path.into();
        self
    }

    /// `nix run nixpkgs#darwin.linux-builder`, run from `cwd`.
    ///
    /// The VM writes its SSH key pair to `<cwd>/keys/`.
    pub fn darwin_builder(cwd: &Path) -> Self {
        LaunchSpec::new("linux-builder", "nix")
            .arg("run")
            .arg(Self::DARWIN_BUILDER_INSTALLABLE)
            .target(ssh_destination(DARWIN_BUILDER_HOST))
            .credential(cwd.join("keys").join("builder_ed25519"))
    }

    /// The command as a single display string.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A spawned agent process, exclusively owned by one bring-up.
#[async_trait]
pub trait AgentProcess: Send + 'static {
    /// OS process id, while the process has not been reaped.
    fn id(&self) -> Option<u32>;

    /// Polls for exit without blocking.
    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Asks the process to exit. `Ok` if it already has.
    fn terminate(&mut self) -> io::Result<()>;

    /// Kills the process. `Ok` if it already exited. Must not block.
    fn kill(&mut self) -> io::Result<()>;

    /// Waits for the process to exit.
    async fn wait(&mut self) -> io::Result<ProcessExit>;
}

/// Spawns agent processes.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self, spec: &LaunchSpec, cwd: &Path) -> io::Result<Box<dyn AgentProcess>>;
}

/// Launches agents as child processes via `tokio::process`.
///
/// Children inherit stdout/stderr, get a null stdin, and are killed if their
/// handle is dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec, cwd: &Path) -> io::Result<Box<dyn AgentProcess>> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(CommandProcess::new(child)))
    }
}

/// [`AgentProcess`] backed by a `tokio::process::Child`.
#[derive(Debug)]
pub struct CommandProcess {
    child: Child,
}

impl CommandProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl AgentProcess for CommandProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.child.id().is_none() {
            return Ok(());
        }
        match self.child.start_kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            res => res,
        }
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        Ok(self.child.wait().await?.into())
    }
}
