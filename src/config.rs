//! # User configuration: the `builders.toml` file.
//!
//! ```toml
//! [[builders]]
//! host = "ssh://root@big-box"
//! systems = ["x86_64-linux"]
//! max_builds = 16
//! ```
//!
//! A missing file is an empty builder list. Unknown keys, a missing `host`
//! and malformed TOML are errors.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::builder::Builder;
use crate::error::ConfigError;

/// A loaded configuration file and where it came from.
#[derive(Debug)]
pub struct Config {
    pub file: ConfigFile,
    pub path: PathBuf,
}

impl Config {
    /// The contents of the default configuration file.
    pub const DEFAULT: &str = include_str!("../builders.toml");

    /// Loads `path`, or the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => Self::default_path()?,
        };
        let file = ConfigFile::read(&path)?;
        Ok(Self { file, path })
    }

    /// `$XDG_CONFIG_HOME/nix/builders.toml`, else `$HOME/.config/nix/builders.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        config_path_from(env::var_os("XDG_CONFIG_HOME"), env::var_os("HOME"))
    }

    /// Writes [`Config::DEFAULT`] to `path`, creating parent directories.
    ///
    /// Refuses to overwrite an existing file.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists {
                path: path.to_owned(),
            });
        }
        tracing::info!(path = %path.display(), "Writing default configuration file");

        let write = |source: io::Error| ConfigError::Write {
            path: path.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write)?;
        }
        fs::write(path, Self::DEFAULT).map_err(write)
    }

    pub fn builders(&self) -> &[Builder] {
        &self.file.builders
    }
}

fn config_path_from(
    xdg_config_home: Option<std::ffi::OsString>,
    home: Option<std::ffi::OsString>,
) -> Result<PathBuf, ConfigError> {
    let config_home = xdg_config_home
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            home.filter(|dir| !dir.is_empty())
                .map(|home| PathBuf::from(home).join(".config"))
        })
        .ok_or(ConfigError::NoConfigDir)?;
    Ok(config_home.join("nix").join(ConfigFile::FILE_NAME))
}

/// Configuration file format. See `builders.toml` for the documented template.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub builders: Vec<Builder>,
}

impl ConfigFile {
    pub const FILE_NAME: &str = "builders.toml";

    /// Parses file contents; `path` is only used in errors.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Reads and parses `path`, resolving public-key files next to it.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using no builders");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                });
            }
        };

        let mut file = Self::parse(&text, path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        for builder in &mut file.builders {
            builder.resolve_public_key(base)?;
        }
        tracing::debug!(path = %path.display(), builders = file.builders.len(), "Loaded configuration");
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PublicKey;

    #[test]
    fn test_default_template_parses_to_no_builders() {
        let file = ConfigFile::parse(Config::DEFAULT, Path::new("builders.toml")).unwrap();
        assert!(file.builders.is_empty());
    }

    #[test]
    fn test_parse_builders() {
        let text = r#"
            [[builders]]
            host = "ssh://root@big-box"
            systems = ["x86_64-linux"]
            max_builds = 16
            speed_factor = 2.0
            features = ["kvm", "big-parallel"]

            [[builders]]
            host = "ssh-ng://small-box"
        "#;
        let file = ConfigFile::parse(text, Path::new("b.toml")).unwrap();
        assert_eq!(file.builders.len(), 2);
        assert_eq!(
            file.builders[0].as_nix_config(),
            "ssh://root@big-box x86_64-linux - 16 2 kvm,big-parallel - -"
        );
        assert_eq!(file.builders[1], Builder::new("ssh-ng://small-box"));
    }

    #[test]
    fn test_missing_host_is_rejected() {
        let err = ConfigFile::parse("[[builders]]\nsystems = []\n", Path::new("b.toml")).unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let text = "[[builders]]\nhost = \"a\"\nspeed = 1\n";
        let err = ConfigFile::parse(text, Path::new("b.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::read(&dir.path().join("builders.toml")).unwrap();
        assert_eq!(file, ConfigFile::default());
    }

    #[test]
    fn test_read_resolves_key_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("box.pub"), b"ssh-ed25519 CCCC").unwrap();
        let path = dir.path().join("builders.toml");
        fs::write(&path, "[[builders]]\nhost = \"ssh://box\"\npublic_key = \"box.pub\"\n").unwrap();

        let file = ConfigFile::read(&path).unwrap();
        assert!(matches!(
            &file.builders[0].public_key,
            Some(PublicKey::File { contents, .. }) if contents == b"ssh-ed25519 CCCC"
        ));
    }

    #[test]
    fn test_write_default_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nix").join("builders.toml");

        Config::write_default(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), Config::DEFAULT);

        let err = Config::write_default(&path).unwrap_err();
        assert_eq!(err.as_label(), "config_exists");
    }

    #[test]
    fn test_config_path_resolution() {
        assert_eq!(
            config_path_from(Some("/xdg".into()), Some("/home/u".into())).unwrap(),
            PathBuf::from("/xdg/nix/builders.toml")
        );
        assert_eq!(
            config_path_from(Some("".into()), Some("/home/u".into())).unwrap(),
            PathBuf::from("/home/u/.config/nix/builders.toml")
        );
        assert!(matches!(
            config_path_from(None, None),
            Err(ConfigError::NoConfigDir)
        ));
    }
}
