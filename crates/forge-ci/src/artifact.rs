//! Values handed between pipeline stages: binaries, images, secrets, services.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target operating system and CPU architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// linux/amd64, the only platform score-server ships for.
    pub fn linux_amd64() -> Self {
        Self::new("linux", "amd64")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Options passed to the Go cross-compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub platform: Platform,

    /// Produce a statically linked executable (no cgo).
    pub static_link: bool,

    /// Extra `go build` arguments.
    pub args: Vec<String>,
}

impl BuildOptions {
    /// Static linux/amd64 build with no extra flags.
    pub fn static_linux_amd64() -> Self {
        Self {
            platform: Platform::linux_amd64(),
            static_link: true,
            args: Vec::new(),
        }
    }
}

/// A compiled executable on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binary {
    pub path: PathBuf,
    pub options: BuildOptions,
}

/// Handle to a container image built by an [`ImagePackager`](crate::ImagePackager).
///
/// Naming, tagging and port exposure return a new value; the packager-assigned
/// `id` never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Packager-assigned identifier (e.g. `sha256:...`).
    pub id: String,

    pub platform: Platform,

    /// Options the packaged binary was built with.
    pub build: BuildOptions,

    pub entrypoint: Vec<String>,

    /// Repository path inside the registry, e.g. `playground/score-server`.
    pub name: Option<String>,

    pub tags: Vec<String>,

    pub exposed_ports: BTreeSet<u16>,
}

impl Image {
    pub fn new(id: impl Into<String>, binary: &Binary, entrypoint: Vec<String>, platform: Platform) -> Self {
        Self {
            id: id.into(),
            platform,
            build: binary.options.clone(),
            entrypoint,
            name: None,
            tags: Vec::new(),
            exposed_ports: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the image tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.exposed_ports.insert(port);
        self
    }

    /// `name:tag` references for every tag, without registry host.
    pub fn references(&self) -> Vec<String> {
        match &self.name {
            Some(name) => self.tags.iter().map(|t| format!("{name}:{t}")).collect(),
            None => Vec::new(),
        }
    }
}

/// An opaque credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// Read a secret from an environment variable.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().filter(|v| !v.is_empty()).map(Secret)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Registry flavour the publisher talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    Harbor,
}

/// Where the publisher resolves registry credentials from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    Vault,
}

/// How an image is pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPolicy {
    pub registry: RegistryKind,
    pub secret_backend: SecretBackend,
    pub use_sandbox: bool,
    pub sign: bool,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            registry: RegistryKind::Harbor,
            secret_backend: SecretBackend::Vault,
            use_sandbox: false,
            sign: false,
        }
    }
}

/// Options for reading the current commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitQuery {
    /// Abbreviated SHA instead of the full 40 hex chars.
    pub short: bool,

    /// Do not fail when the work tree has uncommitted changes.
    pub ignore_dirty: bool,
}

/// A running, network-exposed instance of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Runtime-assigned identifier (container id).
    pub id: String,
    pub image: Image,
    pub ports: Vec<u16>,
    pub started_at: DateTime<Utc>,
}

impl Service {
    /// Host endpoints for each exposed port.
    pub fn endpoints(&self) -> Vec<String> {
        self.ports
            .iter()
            .map(|p| format!("http://localhost:{p}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary() -> Binary {
        Binary {
            path: PathBuf::from("/tmp/score-server"),
            options: BuildOptions::static_linux_amd64(),
        }
    }

    #[test]
    fn static_build_targets_linux_amd64() {
        let opts = BuildOptions::static_linux_amd64();
        assert_eq!(opts.platform.to_string(), "linux/amd64");
        assert!(opts.static_link);
        assert!(opts.args.is_empty());
    }

    #[test]
    fn naming_keeps_image_id() {
        let image = Image::new("sha256:abc", &binary(), vec!["./score-server".into()], Platform::linux_amd64());
        let named = image
            .clone()
            .with_name("playground/score-server")
            .with_tags(["score-server-1a2b3c4"]);

        assert_eq!(named.id, image.id);
        assert_eq!(
            named.references(),
            vec!["playground/score-server:score-server-1a2b3c4".to_string()]
        );
        assert!(image.references().is_empty());
    }

    #[test]
    fn exposing_a_port_twice_keeps_one_entry() {
        let image = Image::new("sha256:abc", &binary(), vec![], Platform::linux_amd64())
            .with_exposed_port(5800)
            .with_exposed_port(5800);
        assert_eq!(image.exposed_ports.len(), 1);
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("hvs.very-secret");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.expose(), "hvs.very-secret");
    }

    #[test]
    fn default_publish_policy_is_unsigned_harbor() {
        let policy = PublishPolicy::default();
        assert_eq!(policy.registry, RegistryKind::Harbor);
        assert_eq!(policy.secret_backend, SecretBackend::Vault);
        assert!(!policy.use_sandbox);
        assert!(!policy.sign);
    }

    #[test]
    fn service_endpoints() {
        let image = Image::new("sha256:abc", &binary(), vec![], Platform::linux_amd64());
        let service = Service {
            id: "c0ffee".to_string(),
            image,
            ports: vec![5800],
            started_at: Utc::now(),
        };
        assert_eq!(service.endpoints(), vec!["http://localhost:5800".to_string()]);
    }
}
