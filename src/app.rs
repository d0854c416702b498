use std::ffi::OsString;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::agent::{LaunchSpec, Supervisor, SupervisorConfig};
use crate::builder::{self, Builder};
use crate::cli::Cli;
use crate::config::Config;
use crate::privilege::PrivilegeCheck;
use crate::subscribers::{LogWriter, Subscribe};

/// Exit code reported when a command is interrupted by a termination signal.
const INTERRUPTED: u8 = 130;

/// The `nix-remote` program, one run per invocation.
pub struct App {
    cli: Cli,
    privilege: PrivilegeCheck,
    supervisor: SupervisorConfig,
}

impl App {
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            privilege: PrivilegeCheck::default(),
            supervisor: SupervisorConfig::default(),
        }
    }

    pub fn with_privilege_check(mut self, check: PrivilegeCheck) -> Self {
        self.privilege = check;
        self
    }

    pub fn with_supervisor_config(mut self, cfg: SupervisorConfig) -> Self {
        self.supervisor = cfg;
        self
    }

    /// Runs until the command finishes or `token` is cancelled.
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<ExitCode> {
        self.execute(token).await.map(ExitCode::from)
    }

    async fn execute(self, token: CancellationToken) -> anyhow::Result<u8> {
        if let Some(path) = &self.cli.generate_config {
            generate_config(path.as_deref())?;
            return Ok(0);
        }

        self.privilege.check().await?;

        let config = Config::load(self.cli.config.as_deref())?;
        let mut builders = config.file.builders;

        if self.cli.command.is_empty() {
            print!("{}", builder::nix_config(&builders));
            return Ok(0);
        }

        if !self.cli.wants_darwin_builder() {
            return run_command(&self.cli.command, &builder::nix_config(&builders), &token).await;
        }

        builders.push(Builder::darwin_builder());
        let nix_config = builder::nix_config(&builders);
        let workdir = tempfile::Builder::new()
            .prefix("nix-remote-")
            .tempdir()
            .context("Failed to create a working directory for the linux builder")?;
        let spec = LaunchSpec::darwin_builder(workdir.path());
        tracing::info!(
            command = %spec.command_line(),
            dir = %workdir.path().display(),
            "Running on macOS, starting the linux builder"
        );

        let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
        let supervisor = Supervisor::builder(self.supervisor)
            .with_subscribers(subscribers)
            .build();
        let command = &self.cli.command;
        let result = supervisor
            .with_agent(workdir.path(), &spec, &token, |agent| {
                let nix_config = &nix_config;
                let token = &token;
                async move {
                    tracing::info!(
                        agent = agent.name(),
                        attempts = agent.attempts(),
                        elapsed = ?agent.elapsed(),
                        "Linux builder is ready"
                    );
                    run_command(command, nix_config, token).await
                }
            })
            .await;
        supervisor.close().await;
        result
    }
}

fn generate_config(path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) if path == Path::new("-") => {
            print!("{}", Config::DEFAULT);
            Ok(())
        }
        Some(path) => Ok(Config::write_default(path)?),
        None => Ok(Config::write_default(&Config::default_path()?)?),
    }
}

/// Runs `command` with `NIX_CONFIG` set and returns its exit code.
async fn run_command(
    command: &[OsString],
    nix_config: &str,
    token: &CancellationToken,
) -> anyhow::Result<u8> {
    let (program, args) = command.split_first().context("No command given")?;
    let program_name = program.to_string_lossy().into_owned();
    tracing::debug!(command = %program_name, %nix_config, "Running command");

    let mut child = Command::new(program)
        .args(args)
        .env("NIX_CONFIG", nix_config)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to run `{program_name}`"))?;

    let finished = tokio::select! {
        status = child.wait() => Some(status),
        _ = token.cancelled() => None,
    };

    match finished {
        Some(status) => {
            let status = status.with_context(|| format!("Failed to wait for `{program_name}`"))?;
            if !status.success() {
                tracing::warn!(command = %program_name, %status, "Command failed");
            }
            Ok(status.code().and_then(|code| u8::try_from(code).ok()).unwrap_or(1))
        }
        None => {
            tracing::warn!(command = %program_name, "Interrupted, stopping command");
            child
                .start_kill()
                .with_context(|| format!("Failed to kill `{program_name}`"))?;
            let _ = child.wait().await;
            Ok(INTERRUPTED)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use clap::Parser;

    fn app(args: &[&str]) -> App {
        let cli = Cli::try_parse_from(std::iter::once("nix-remote").chain(args.iter().copied()))
            .unwrap();
        App::new(cli).with_privilege_check(PrivilegeCheck {
            program: "echo".into(),
            args: vec!["root".into()],
        })
    }

    #[tokio::test]
    async fn test_command_sees_nix_config_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("builders.toml");
        std::fs::write(&config, "[[builders]]\nhost = \"ssh://box\"\n").unwrap();
        let config = config.to_str().unwrap();

        let script = r#"test "$(printf '%s' "$NIX_CONFIG")" = "$(printf 'builders = ssh://box - - - - - - -\nbuilders-use-substitutes = true')" && exit 4"#;
        let code = app(&["--config", config, "--no-darwin-builder", "--", "sh", "-c", script])
            .execute(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(code, 4);
    }

    #[tokio::test]
    async fn test_privilege_failure_stops_before_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let config = dir.path().join("missing.toml");

        let err = app(&[
            "--config",
            config.to_str().unwrap(),
            "--no-darwin-builder",
            "--",
            "touch",
            marker.to_str().unwrap(),
        ])
        .with_privilege_check(PrivilegeCheck {
            program: "echo".into(),
            args: vec!["alice".into()],
        })
        .execute(CancellationToken::new())
        .await
        .unwrap_err();

        assert!(err.to_string().contains("root privileges"));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_privilege_checked_before_config_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("b.toml");
        std::fs::write(&config, "[[builders]\nhost = ").unwrap();
        let config = config.to_str().unwrap();
        let unprivileged = PrivilegeCheck {
            program: "echo".into(),
            args: vec!["alice".into()],
        };

        for args in [
            &["--config", config][..],
            &["--config", config, "--no-darwin-builder", "--", "true"][..],
        ] {
            let err = app(args)
                .with_privilege_check(unprivileged.clone())
                .execute(CancellationToken::new())
                .await
                .unwrap_err();
            let err = err.downcast::<crate::error::PrivilegeError>().unwrap();
            assert_eq!(err.as_label(), "privilege_not_root");
        }
    }

    #[tokio::test]
    async fn test_malformed_config_is_reported_after_privilege_check() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("b.toml");
        std::fs::write(&config, "[[builders]\nhost = ").unwrap();

        let err = app(&["--config", config.to_str().unwrap()])
            .execute(CancellationToken::new())
            .await
            .unwrap_err();
        let err = err.downcast::<crate::error::ConfigError>().unwrap();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[tokio::test]
    async fn test_generate_config_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nix").join("builders.toml");
        let path = path.to_str().unwrap();

        assert_eq!(
            app(&["--generate-config", path])
                .execute(CancellationToken::new())
                .await
                .unwrap(),
            0
        );
        assert_eq!(std::fs::read_to_string(path).unwrap(), Config::DEFAULT);
        assert!(
            app(&["--generate-config", path])
                .execute(CancellationToken::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_cancellation_stops_command() {
        let token = CancellationToken::new();
        token.cancel();
        let command = [OsString::from("sleep"), OsString::from("30")];
        let code = run_command(&command, "", &token).await.unwrap();
        assert_eq!(code, INTERRUPTED);
    }
}
