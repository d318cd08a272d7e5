//! Pipeline configuration.
//!
//! Defaults, then `<workspace>/.forge/forge.json`, then `FORGE_*` environment
//! variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ForgeError, Result};
use crate::source::PIPELINE_DIR;

/// File name of the optional config file inside the pipeline directory.
pub const CONFIG_FILE: &str = "forge.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Go package that builds the service binary.
    pub go_package: String,
    pub binary_name: String,
    /// Base image for the packaged binary.
    pub base_image: String,
    /// Where compiled binaries and build contexts are written.
    pub artifact_dir: PathBuf,
    pub registry_host: String,
    pub sandbox_registry_host: String,
    pub registry_user: String,
    pub primary_branch: String,
    /// Publish primary-branch builds to the signed namespace.
    pub promote_primary_branch: bool,
    /// Also run staticcheck during verification.
    pub staticcheck: bool,
    /// Also run `go test -race` during verification.
    pub race_tests: bool,
    /// Per external command; 0 disables the timeout.
    pub command_timeout_secs: u64,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            go_package: "./cmd/score-server".to_string(),
            binary_name: "score-server".to_string(),
            base_image: "scratch".to_string(),
            artifact_dir: std::env::temp_dir().join("score-forge"),
            registry_host: "container-registry.secretcdn.net".to_string(),
            sandbox_registry_host: "sandbox.container-registry.secretcdn.net".to_string(),
            registry_user: "robot$forge".to_string(),
            primary_branch: "main".to_string(),
            promote_primary_branch: false,
            staticcheck: false,
            race_tests: false,
            command_timeout_secs: 900,
        }
    }
}

impl ForgeConfig {
    /// Load the config for a workspace: file (if present) then environment.
    pub fn load(workspace: &Path) -> Result<Self> {
        let path = workspace.join(PIPELINE_DIR).join(CONFIG_FILE);
        let config = if path.is_file() {
            debug!(path = %path.display(), "Loading forge config");
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ForgeError::Config(format!("{}: {e}", path.display())))
    }

    /// Apply `FORGE_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FORGE_GO_PACKAGE") {
            self.go_package = v;
        }
        if let Some(v) = lookup("FORGE_BINARY_NAME") {
            self.binary_name = v;
        }
        if let Some(v) = lookup("FORGE_BASE_IMAGE") {
            self.base_image = v;
        }
        if let Some(v) = lookup("FORGE_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORGE_REGISTRY_HOST") {
            self.registry_host = v;
        }
        if let Some(v) = lookup("FORGE_SANDBOX_REGISTRY_HOST") {
            self.sandbox_registry_host = v;
        }
        if let Some(v) = lookup("FORGE_REGISTRY_USER") {
            self.registry_user = v;
        }
        if let Some(v) = lookup("FORGE_PRIMARY_BRANCH") {
            self.primary_branch = v;
        }
        if let Some(v) = lookup("FORGE_PROMOTE_PRIMARY_BRANCH") {
            self.promote_primary_branch = parse_bool("FORGE_PROMOTE_PRIMARY_BRANCH", &v)?;
        }
        if let Some(v) = lookup("FORGE_STATICCHECK") {
            self.staticcheck = parse_bool("FORGE_STATICCHECK", &v)?;
        }
        if let Some(v) = lookup("FORGE_RACE_TESTS") {
            self.race_tests = parse_bool("FORGE_RACE_TESTS", &v)?;
        }
        if let Some(v) = lookup("FORGE_COMMAND_TIMEOUT_SECS") {
            self.command_timeout_secs = v.trim().parse().map_err(|_| {
                ForgeError::Config(format!("FORGE_COMMAND_TIMEOUT_SECS must be an integer, got {v:?}"))
            })?;
        }
        Ok(self)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ForgeError::Config(format!("{key} must be a boolean, got {other:?}"))),
    }
}
