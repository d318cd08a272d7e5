//! Collaborator trait definitions
//!
//! Every external system a pipeline stage talks to sits behind one of these
//! traits:
//! - `GoToolchain`: vet, staticcheck, test and cross-compile Go sources
//! - `ImagePackager`: wrap a binary into a container image
//! - `VcsReader`: commit, repository name and branch of a source tree
//! - `RegistryPublisher`: push an image to a registry
//! - `ServiceRuntime`: run an image as a network-exposed service
//!
//! CLI-backed implementations live in `adapters`; recording fakes for tests
//! live in `fakes`.

use async_trait::async_trait;

use crate::artifact::{Binary, BuildOptions, CommitQuery, Image, Platform, PublishPolicy, Secret, Service};
use crate::error::Result;
use crate::source::SourceDir;

/// Go toolchain operations over a source tree.
#[async_trait]
pub trait GoToolchain: Send + Sync {
    /// `go vet` diagnostics. Empty when clean.
    async fn vet(&self, src: &SourceDir) -> Result<String>;

    /// `staticcheck` diagnostics. Empty when clean.
    async fn staticcheck(&self, src: &SourceDir) -> Result<String>;

    /// Run the test suite with extra arguments and return its output.
    ///
    /// A failing suite is an `Err`.
    async fn test(&self, src: &SourceDir, args: &[String]) -> Result<String>;

    /// Cross-compile the service binary.
    async fn build(&self, src: &SourceDir, options: &BuildOptions) -> Result<Binary>;
}

/// Builds container images around a compiled binary.
#[async_trait]
pub trait ImagePackager: Send + Sync {
    async fn package(&self, binary: &Binary, entrypoint: &[String], platform: &Platform) -> Result<Image>;
}

/// Read-only version-control metadata.
#[async_trait]
pub trait VcsReader: Send + Sync {
    async fn commit(&self, src: &SourceDir, query: CommitQuery) -> Result<String>;

    async fn repo_name(&self, src: &SourceDir) -> Result<String>;

    async fn branch(&self, src: &SourceDir) -> Result<String>;
}

/// Pushes named, tagged images to a registry.
#[async_trait]
pub trait RegistryPublisher: Send + Sync {
    async fn publish(&self, image: &Image, token: &Secret, policy: &PublishPolicy) -> Result<()>;
}

/// Runs images as services.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Start `image` with its exposed ports bound on the host.
    async fn as_service(&self, image: &Image) -> Result<Service>;

    async fn stop(&self, service: &Service) -> Result<()>;
}
