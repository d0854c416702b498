//! # Readiness probe.
//!
//! A [`Probe`] makes one short-lived connection attempt against an agent and
//! reports success or a [`ProbeFailure`] carrying a short diagnostic.
//! [`SshProbe`] runs a no-op remote command over `ssh`:
//!
//! ```text
//! ssh -i <credential> -o ConnectTimeout=<secs> -o BatchMode=yes -o StrictHostKeyChecking=no <target> true
//! ```

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::agent::ProcessExit;
use crate::error::ProbeFailure;

/// One readiness check against an agent.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn probe(&self, target: &str, credential: &Path) -> Result<(), ProbeFailure>;
}

/// Probes reachability by running `true` on the target over SSH.
#[derive(Clone, Debug)]
pub struct SshProbe {
    /// The `ssh` executable.
    pub program: String,
    /// Passed to ssh as `ConnectTimeout` (whole seconds, at least 1).
    pub connect_timeout: Duration,
    /// Extra `-o` options.
    pub options: Vec<String>,
}

impl Default for SshProbe {
    fn default() -> Self {
        Self {
            program: "ssh".into(),
            connect_timeout: Duration::from_secs(5),
            options: vec!["BatchMode=yes".into(), "StrictHostKeyChecking=no".into()],
        }
    }
}

#[async_trait]
impl Probe for SshProbe {
    async fn probe(&self, target: &str, credential: &Path) -> Result<(), ProbeFailure> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(credential)
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.connect_timeout.as_secs().max(1)
            ));
        for option in &self.options {
            cmd.arg("-o").arg(option);
        }

        let output = cmd
            .arg(target)
            .arg("true")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeFailure::new(format!("failed to run {}: {e}", self.program)))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if stderr.is_empty() {
            Err(ProbeFailure::new(ProcessExit::from(output.status).to_string()))
        } else {
            Err(ProbeFailure::new(stderr))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn probe_with(program: &str) -> SshProbe {
        SshProbe {
            program: program.into(),
            ..SshProbe::default()
        }
    }

    #[tokio::test]
    async fn test_zero_exit_is_ready() {
        let res = probe_with("true")
            .probe("builder@localhost", Path::new("/nonexistent"))
            .await;
        assert_eq!(res, Ok(()));
    }

    #[tokio::test]
    async fn test_non_zero_exit_without_stderr_reports_code() {
        let res = probe_with("false")
            .probe("builder@localhost", Path::new("/nonexistent"))
            .await;
        assert_eq!(res, Err(ProbeFailure::new("exit code 1")));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_probe_failure() {
        let err = probe_with("/nonexistent/ssh")
            .probe("builder@localhost", Path::new("/nonexistent"))
            .await
            .unwrap_err();
        assert!(err.diagnostic.starts_with("failed to run /nonexistent/ssh"));
    }
}
