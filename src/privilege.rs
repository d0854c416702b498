//! Elevated-privilege check run before any builder is brought up.

use std::process::Stdio;

use tokio::process::Command;

use crate::error::PrivilegeError;

/// Runs a command that must print `root` on stdout.
///
/// The default is `sudo whoami`, which also primes sudo's credential cache so
/// later elevated steps do not prompt mid-run.
#[derive(Clone, Debug)]
pub struct PrivilegeCheck {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for PrivilegeCheck {
    fn default() -> Self {
        Self {
            program: "sudo".into(),
            args: vec!["whoami".into()],
        }
    }
}

impl PrivilegeCheck {
    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn check(&self) -> Result<(), PrivilegeError> {
        let command = self.command_line();
        tracing::info!(%command, "Checking elevated privileges");

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|source| PrivilegeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PrivilegeError::Denied {
                command,
                status: output.status,
            });
        }

        let user = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if user != "root" {
            return Err(PrivilegeError::NotRoot { command, user });
        }
        Ok(())
    }
}
