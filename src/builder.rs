//! # Remote builder records.
//!
//! A [`Builder`] is one entry of Nix's `builders` setting. It renders as the
//! positional machine-spec line Nix expects:
//!
//! ```text
//! <host> <systems> <private-key> <max-builds> <speed-factor> <features> <mandatory-features> <public-key>
//! ```
//!
//! Unset fields render as `-`. Lists are comma-joined. The public key is
//! standard base64 of its raw bytes. Several builders are joined with `" ; "`.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Deserialize;

use crate::error::ConfigError;

/// Host of the darwin linux-builder VM.
pub const DARWIN_BUILDER_HOST: &str = "ssh-ng://builder@linux-builder";

const DARWIN_BUILDER_KEY: &str = "/etc/nix/builder_ed25519";
const DARWIN_BUILDER_HOST_KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIJBWcxb/Blaqt1auOtE+F8QUWrUotiC5qBJ+UuEWdVCb root@nixos\n";

/// Strips the `ssh-ng://` or `ssh://` scheme from a builder host.
pub fn ssh_destination(host: &str) -> &str {
    host.strip_prefix("ssh-ng://")
        .or_else(|| host.strip_prefix("ssh://"))
        .unwrap_or(host)
}

/// A builder's SSH host key.
///
/// Read from the config either as the key itself or as a path to a key file,
/// see [`Builder::resolve_public_key`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PublicKey {
    Inline(String),
    File { path: PathBuf, contents: Vec<u8> },
}

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Inline(key) => key.as_bytes(),
            PublicKey::File { contents, .. } => contents,
        }
    }
}

impl From<String> for PublicKey {
    fn from(key: String) -> Self {
        PublicKey::Inline(key)
    }
}

/// One remote builder.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Builder {
    pub host: String,
    #[serde(default)]
    pub systems: Vec<String>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default)]
    pub max_builds: Option<usize>,
    #[serde(default)]
    pub speed_factor: Option<f32>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub mandatory_features: Vec<String>,
    #[serde(default)]
    pub public_key: Option<PublicKey>,
}

impl Builder {
    /// A builder with only `host` set.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            systems: Vec::new(),
            private_key: None,
            max_builds: None,
            speed_factor: None,
            features: Vec::new(),
            mandatory_features: Vec::new(),
            public_key: None,
        }
    }

    /// The record for the VM started by `nix run nixpkgs#darwin.linux-builder`.
    pub fn darwin_builder() -> Self {
        let max_builds = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);

        Self {
            systems: vec![linux_system(std::env::consts::ARCH)],
            private_key: Some(PathBuf::from(DARWIN_BUILDER_KEY)),
            max_builds: Some(max_builds),
            features: vec!["benchmark".into(), "big-parallel".into()],
            public_key: Some(PublicKey::Inline(DARWIN_BUILDER_HOST_KEY.into())),
            ..Self::new(DARWIN_BUILDER_HOST)
        }
    }

    /// Replaces an inline key that names an existing file with the file's bytes.
    ///
    /// Relative paths resolve against `base`.
    pub fn resolve_public_key(&mut self, base: &Path) -> Result<(), ConfigError> {
        let Some(PublicKey::Inline(value)) = &self.public_key else {
            return Ok(());
        };
        let path = base.join(value);
        if !path.is_file() {
            return Ok(());
        }
        let contents = std::fs::read(&path).map_err(|source| ConfigError::PublicKey {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(host = %self.host, path = %path.display(), "Read builder public key");
        self.public_key = Some(PublicKey::File { path, contents });
        Ok(())
    }

    /// The machine-spec line for this builder.
    pub fn as_nix_config(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(items: &[String]) -> String {
            if items.is_empty() {
                "-".into()
            } else {
                items.join(",")
            }
        }
        fn opt<T: ToString>(value: Option<T>) -> String {
            value.map_or_else(|| "-".into(), |v| v.to_string())
        }

        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.host,
            list(&self.systems),
            opt(self.private_key.as_ref().map(|p| p.display())),
            opt(self.max_builds),
            opt(self.speed_factor),
            list(&self.features),
            list(&self.mandatory_features),
            opt(self
                .public_key
                .as_ref()
                .map(|key| BASE64_STANDARD.encode(key.as_bytes()))),
        )
    }
}

/// All builders as one `builders` value.
pub fn machines(builders: &[Builder]) -> String {
    builders
        .iter()
        .map(Builder::as_nix_config)
        .collect::<Vec<_>>()
        .join(" ; ")
}

/// The `NIX_CONFIG` value that points Nix at `builders`.
pub fn nix_config(builders: &[Builder]) -> String {
    format!(
        "builders = {}\nbuilders-use-substitutes = true\n",
        machines(builders)
    )
}

/// Nix system double for a Linux VM on this CPU.
fn linux_system(arch: &str) -> String {
    match arch {
        "arm64" => "aarch64-linux".into(),
        other => format!("{other}-linux"),
    }
}
