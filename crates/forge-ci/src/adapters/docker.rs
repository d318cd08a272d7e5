//! Image packaging, publishing and service runs via the `docker` CLI.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::artifact::{Binary, Image, Platform, PublishPolicy, Secret, Service};
use crate::collaborators::{ImagePackager, RegistryPublisher, ServiceRuntime};
use crate::config::ForgeConfig;
use crate::error::{ForgeError, Result};
use crate::process::{CommandRunner, CommandSpec};

/// Render the Dockerfile that wraps a single binary.
pub(crate) fn render_dockerfile(base_image: &str, binary_name: &str, entrypoint: &[String]) -> Result<String> {
    let entrypoint = serde_json::to_string(entrypoint)?;
    Ok(format!(
        "FROM {base_image}\nWORKDIR /\nCOPY {binary_name} /{binary_name}\nENTRYPOINT {entrypoint}\n"
    ))
}

pub struct DockerPackager {
    runner: CommandRunner,
    config: Arc<ForgeConfig>,
    docker: String,
}

impl DockerPackager {
    pub fn new(runner: CommandRunner, config: Arc<ForgeConfig>) -> Self {
        Self {
            runner,
            config,
            docker: "docker".to_string(),
        }
    }

    /// Use another `docker` executable.
    pub fn with_docker_binary(mut self, docker: impl Into<String>) -> Self {
        self.docker = docker.into();
        self
    }

    /// Whether `dir` is a per-build directory this pipeline created.
    fn owns_build_dir(&self, dir: &Path) -> bool {
        dir != self.config.artifact_dir.as_path() && dir.starts_with(&self.config.artifact_dir)
    }

    async fn build_image(
        &self,
        context: &Path,
        binary: &Binary,
        entrypoint: &[String],
        platform: &Platform,
    ) -> Result<String> {
        let binary_name = binary
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ForgeError::Config(format!("binary path has no file name: {}", binary.path.display())))?;

        let dockerfile = render_dockerfile(&self.config.base_image, &binary_name, entrypoint)?;
        tokio::fs::write(context.join("Dockerfile"), dockerfile).await?;

        let iidfile = context.join("image.id");
        let spec = CommandSpec::new(
            &self.docker,
            [
                "build".to_string(),
                "--platform".to_string(),
                platform.to_string(),
                "--iidfile".to_string(),
                iidfile.to_string_lossy().to_string(),
                context.to_string_lossy().to_string(),
            ],
        );
        self.runner.run_checked(&spec).await?;

        Ok(tokio::fs::read_to_string(&iidfile).await?.trim().to_string())
    }
}

#[async_trait]
impl ImagePackager for DockerPackager {
    /// Build the image, then remove the build directory the binary was
    /// compiled into. Binaries outside `artifact_dir` are left in place.
    async fn package(&self, binary: &Binary, entrypoint: &[String], platform: &Platform) -> Result<Image> {
        let context = binary.path.parent().unwrap_or_else(|| Path::new("."));
        let built = self.build_image(context, binary, entrypoint, platform).await;

        if self.owns_build_dir(context) {
            if let Err(e) = tokio::fs::remove_dir_all(context).await {
                warn!(dir = %context.display(), error = %e, "Could not remove build context");
            }
        }

        let id = built?;
        info!(image = %id, platform = %platform, "Packaged image");
        Ok(Image::new(id, binary, entrypoint.to_vec(), platform.clone()))
    }
}

pub struct DockerRegistry {
    runner: CommandRunner,
    config: Arc<ForgeConfig>,
}

impl DockerRegistry {
    pub fn new(runner: CommandRunner, config: Arc<ForgeConfig>) -> Self {
        Self { runner, config }
    }

    fn host(&self, policy: &PublishPolicy) -> &str {
        if policy.use_sandbox {
            &self.config.sandbox_registry_host
        } else {
            &self.config.registry_host
        }
    }
}

#[async_trait]
impl RegistryPublisher for DockerRegistry {
    async fn publish(&self, image: &Image, token: &Secret, policy: &PublishPolicy) -> Result<()> {
        let host = self.host(policy).to_string();
        let references = image.references();
        if references.is_empty() {
            return Err(ForgeError::Config(format!(
                "image {} has no name or tags to publish",
                image.id
            )));
        }

        let login = CommandSpec::new(
            "docker",
            ["login", host.as_str(), "--username", self.config.registry_user.as_str(), "--password-stdin"],
        )
        .stdin(token.expose());
        self.runner.run_checked(&login).await?;

        for reference in references {
            let remote = format!("{host}/{reference}");
            self.runner
                .run_checked(&CommandSpec::new("docker", ["tag", image.id.as_str(), remote.as_str()]))
                .await?;
            self.runner
                .run_checked(&CommandSpec::new("docker", ["push", remote.as_str()]))
                .await?;
            info!(reference = %remote, registry = ?policy.registry, "Pushed image");

            if policy.sign {
                self.runner
                    .run_checked(&CommandSpec::new("cosign", ["sign", "--yes", remote.as_str()]))
                    .await?;
                info!(reference = %remote, "Signed image");
            }
        }
        Ok(())
    }
}

/// `docker run -p` arguments binding each port to the same host port.
pub(crate) fn run_args(image: &Image) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string(), "--rm".to_string()];
    for port in &image.exposed_ports {
        args.push("-p".to_string());
        args.push(format!("{port}:{port}"));
    }
    args.push(image.id.clone());
    args
}

pub struct DockerServiceRuntime {
    runner: CommandRunner,
}

impl DockerServiceRuntime {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ServiceRuntime for DockerServiceRuntime {
    async fn as_service(&self, image: &Image) -> Result<Service> {
        if image.exposed_ports.is_empty() {
            warn!(image = %image.id, "Starting service without exposed ports");
        }
        let id = self
            .runner
            .run_checked(&CommandSpec::new("docker", run_args(image)))
            .await?;
        info!(container = %id, ports = ?image.exposed_ports, "Service started");

        Ok(Service {
            id,
            image: image.clone(),
            ports: image.exposed_ports.iter().copied().collect(),
            started_at: Utc::now(),
        })
    }

    async fn stop(&self, service: &Service) -> Result<()> {
        self.runner
            .run_checked(&CommandSpec::new("docker", ["stop", service.id.as_str()]))
            .await?;
        info!(container = %service.id, "Service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::BuildOptions;
    use std::path::PathBuf;

    fn image() -> Image {
        let binary = Binary {
            path: PathBuf::from("/tmp/build/score-server"),
            options: BuildOptions::static_linux_amd64(),
        };
        Image::new("sha256:feed", &binary, vec!["./score-server".to_string()], Platform::linux_amd64())
    }

    #[test]
    fn dockerfile_uses_json_entrypoint() {
        let dockerfile = render_dockerfile("scratch", "score-server", &["./score-server".to_string()]).unwrap();
        assert!(dockerfile.starts_with("FROM scratch\n"));
        assert!(dockerfile.contains("COPY score-server /score-server"));
        assert!(dockerfile.contains(r#"ENTRYPOINT ["./score-server"]"#));
    }

    #[test]
    fn run_args_publish_exposed_ports() {
        let args = run_args(&image().with_exposed_port(5800));
        assert_eq!(args, ["run", "-d", "--rm", "-p", "5800:5800", "sha256:feed"]);
    }

    #[test]
    fn sandbox_policy_switches_host() {
        let registry = DockerRegistry::new(CommandRunner::new(0), Arc::new(ForgeConfig::default()));
        let mut policy = PublishPolicy::default();
        assert_eq!(registry.host(&policy), "container-registry.secretcdn.net");
        policy.use_sandbox = true;
        assert_eq!(registry.host(&policy), "sandbox.container-registry.secretcdn.net");
    }

    #[tokio::test]
    async fn publishing_unnamed_image_is_rejected() {
        let registry = DockerRegistry::new(CommandRunner::new(0), Arc::new(ForgeConfig::default()));
        let err = registry
            .publish(&image(), &Secret::new("t"), &PublishPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[cfg(unix)]
    mod with_fake_docker {
        use super::*;
        use crate::adapters::fake_tool;

        /// Writes a fixed image id to the `--iidfile` argument, then exits with `code`.
        fn fake_docker(dir: &Path, code: i32) -> String {
            fake_tool(
                dir,
                "docker",
                &format!(
                    "while [ $# -gt 0 ]; do\n  if [ \"$1\" = --iidfile ]; then echo sha256:feed > \"$2\"; fi\n  shift\ndone\nexit {code}"
                ),
            )
        }

        fn built_binary(artifacts: &Path) -> Binary {
            let dir = artifacts.join("3f1c9a");
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("score-server");
            std::fs::write(&path, b"\x7fELF").unwrap();
            Binary {
                path,
                options: BuildOptions::static_linux_amd64(),
            }
        }

        fn packager(docker: String, artifacts: &Path) -> DockerPackager {
            let config = ForgeConfig {
                artifact_dir: artifacts.to_path_buf(),
                ..ForgeConfig::default()
            };
            DockerPackager::new(CommandRunner::new(60), Arc::new(config)).with_docker_binary(docker)
        }

        #[tokio::test]
        async fn package_removes_build_context() {
            let bin = tempfile::tempdir().unwrap();
            let artifacts = tempfile::tempdir().unwrap();
            let binary = built_binary(artifacts.path());

            let image = packager(fake_docker(bin.path(), 0), artifacts.path())
                .package(&binary, &["./score-server".to_string()], &Platform::linux_amd64())
                .await
                .unwrap();
            assert_eq!(image.id, "sha256:feed");
            assert_eq!(std::fs::read_dir(artifacts.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn failed_docker_build_removes_build_context() {
            let bin = tempfile::tempdir().unwrap();
            let artifacts = tempfile::tempdir().unwrap();
            let binary = built_binary(artifacts.path());

            let err = packager(fake_docker(bin.path(), 1), artifacts.path())
                .package(&binary, &["./score-server".to_string()], &Platform::linux_amd64())
                .await
                .unwrap_err();
            assert!(matches!(err, ForgeError::CommandFailed { exit_code: 1, .. }));
            assert_eq!(std::fs::read_dir(artifacts.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn binary_outside_artifact_dir_is_kept() {
            let bin = tempfile::tempdir().unwrap();
            let artifacts = tempfile::tempdir().unwrap();
            let elsewhere = tempfile::tempdir().unwrap();
            let binary = built_binary(elsewhere.path());

            packager(fake_docker(bin.path(), 0), artifacts.path())
                .package(&binary, &["./score-server".to_string()], &Platform::linux_amd64())
                .await
                .unwrap();
            assert!(binary.path.exists());
        }
    }
}
