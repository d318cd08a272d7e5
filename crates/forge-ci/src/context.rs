//! Execution context passed explicitly to every stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::{DockerPackager, DockerRegistry, DockerServiceRuntime, GitCli, GoCli};
use crate::collaborators::{GoToolchain, ImagePackager, RegistryPublisher, ServiceRuntime, VcsReader};
use crate::config::ForgeConfig;
use crate::process::CommandRunner;

/// Collaborators and configuration for one pipeline invocation.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct ForgeContext {
    workspace_root: PathBuf,
    config: Arc<ForgeConfig>,
    golang: Arc<dyn GoToolchain>,
    packager: Arc<dyn ImagePackager>,
    git: Arc<dyn VcsReader>,
    registry: Arc<dyn RegistryPublisher>,
    services: Arc<dyn ServiceRuntime>,
}

impl ForgeContext {
    pub fn builder(workspace_root: impl Into<PathBuf>, config: ForgeConfig) -> ForgeContextBuilder {
        ForgeContextBuilder {
            workspace_root: workspace_root.into(),
            config,
            golang: None,
            packager: None,
            git: None,
            registry: None,
            services: None,
        }
    }

    /// Context backed by the `go`, `docker` and `git` command-line tools.
    pub fn local(workspace_root: impl Into<PathBuf>, config: ForgeConfig) -> Self {
        Self::builder(workspace_root, config).build()
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn golang(&self) -> &dyn GoToolchain {
        self.golang.as_ref()
    }

    pub fn packager(&self) -> &dyn ImagePackager {
        self.packager.as_ref()
    }

    pub fn git(&self) -> &dyn VcsReader {
        self.git.as_ref()
    }

    pub fn registry(&self) -> &dyn RegistryPublisher {
        self.registry.as_ref()
    }

    pub fn services(&self) -> &dyn ServiceRuntime {
        self.services.as_ref()
    }
}

/// Builder for [`ForgeContext`]. Unset collaborators default to the CLI adapters.
pub struct ForgeContextBuilder {
    workspace_root: PathBuf,
    config: ForgeConfig,
    golang: Option<Arc<dyn GoToolchain>>,
    packager: Option<Arc<dyn ImagePackager>>,
    git: Option<Arc<dyn VcsReader>>,
    registry: Option<Arc<dyn RegistryPublisher>>,
    services: Option<Arc<dyn ServiceRuntime>>,
}

impl ForgeContextBuilder {
    pub fn golang(mut self, golang: Arc<dyn GoToolchain>) -> Self {
        self.golang = Some(golang);
        self
    }

    pub fn packager(mut self, packager: Arc<dyn ImagePackager>) -> Self {
        self.packager = Some(packager);
        self
    }

    pub fn git(mut self, git: Arc<dyn VcsReader>) -> Self {
        self.git = Some(git);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistryPublisher>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn services(mut self, services: Arc<dyn ServiceRuntime>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn build(self) -> ForgeContext {
        let config = Arc::new(self.config);
        let runner = CommandRunner::new(config.command_timeout_secs);

        let golang: Arc<dyn GoToolchain> = match self.golang {
            Some(golang) => golang,
            None => Arc::new(GoCli::new(runner.clone(), config.clone())),
        };
        let packager: Arc<dyn ImagePackager> = match self.packager {
            Some(packager) => packager,
            None => Arc::new(DockerPackager::new(runner.clone(), config.clone())),
        };
        let git: Arc<dyn VcsReader> = match self.git {
            Some(git) => git,
            None => Arc::new(GitCli::new(runner.clone())),
        };
        let registry: Arc<dyn RegistryPublisher> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(DockerRegistry::new(runner.clone(), config.clone())),
        };
        let services: Arc<dyn ServiceRuntime> = match self.services {
            Some(services) => services,
            None => Arc::new(DockerServiceRuntime::new(runner)),
        };

        ForgeContext {
            workspace_root: self.workspace_root,
            config,
            golang,
            packager,
            git,
            registry,
            services,
        }
    }
}
