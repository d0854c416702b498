use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

/// Run a command with Nix remote builders configured.
///
/// On macOS the `nixpkgs#darwin.linux-builder` VM is started first and added
/// to the builders for the duration of the command.
#[derive(Debug, Clone, Parser)]
#[command(name = "nix-remote", version, about)]
#[command(max_term_width = 100)]
pub struct Cli {
    /// Log filter directives, of the form `target[span{field=value}]=level`.
    ///
    /// Try `debug` or `trace`.
    #[arg(long, default_value = "info", env = "NIX_REMOTE_LOG")]
    pub log: String,

    /// Path to the `builders.toml` configuration file.
    ///
    /// Default: `$XDG_CONFIG_HOME/nix/builders.toml` (or `~/.config/nix/builders.toml`).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the default configuration file and exit.
    ///
    /// Without a path, the default configuration path is used. With `-`, the
    /// file is written to stdout.
    #[arg(long, value_name = "PATH")]
    pub generate_config: Option<Option<PathBuf>>,

    /// Do not start the darwin linux-builder VM, even on macOS.
    #[arg(long)]
    pub no_darwin_builder: bool,

    /// Command to run with `NIX_CONFIG` set. Without one, the `NIX_CONFIG`
    /// value is printed.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<OsString>,
}

impl Cli {
    /// Whether the darwin builder VM should be brought up on this host.
    pub fn wants_darwin_builder(&self) -> bool {
        cfg!(target_os = "macos") && !self.no_darwin_builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_command_after_separator() {
        let cli = Cli::try_parse_from(["nix-remote", "--", "nix", "build", ".#foo"]).unwrap();
        assert_eq!(cli.command, ["nix", "build", ".#foo"]);
        assert_eq!(cli.generate_config, None);
    }

    #[test]
    fn test_generate_config_optional_path() {
        let cli = Cli::try_parse_from(["nix-remote", "--generate-config"]).unwrap();
        assert_eq!(cli.generate_config, Some(None));

        let cli = Cli::try_parse_from(["nix-remote", "--generate-config", "-"]).unwrap();
        assert_eq!(cli.generate_config, Some(Some(PathBuf::from("-"))));
    }

    #[test]
    fn test_no_darwin_builder_flag() {
        let cli = Cli::try_parse_from(["nix-remote", "--no-darwin-builder"]).unwrap();
        assert!(!cli.wants_darwin_builder());
    }
}
