//! Go toolchain via the `go` and `staticcheck` binaries.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{Binary, BuildOptions};
use crate::collaborators::GoToolchain;
use crate::config::ForgeConfig;
use crate::error::{ForgeError, Result};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::source::SourceDir;

pub struct GoCli {
    runner: CommandRunner,
    config: Arc<ForgeConfig>,
    go: String,
}

impl GoCli {
    pub fn new(runner: CommandRunner, config: Arc<ForgeConfig>) -> Self {
        Self {
            runner,
            config,
            go: "go".to_string(),
        }
    }

    /// Use another `go` executable.
    pub fn with_go_binary(mut self, go: impl Into<String>) -> Self {
        self.go = go.into();
        self
    }

    /// Run an analyzer and turn its output into diagnostic text.
    async fn diagnostics(&self, spec: CommandSpec) -> Result<String> {
        let output = self.runner.run(&spec).await?;
        Ok(diagnostic_text(&output))
    }
}

/// Module resolution chatter from the go command (`go: downloading ...`).
fn is_module_progress(line: &str) -> bool {
    ["go: downloading ", "go: finding ", "go: extracting "]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Diagnostics reported by an analyzer run; empty for a clean run.
///
/// A zero exit is clean whatever the go command printed about itself. On a
/// non-zero exit with nothing but module chatter, the exit code is reported.
pub(crate) fn diagnostic_text(output: &CommandOutput) -> String {
    let combined = output.combined();
    let lines = combined.lines().filter(|line| !is_module_progress(line));
    let text = if output.success() {
        lines
            .filter(|line| !line.starts_with("go: "))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        lines.collect::<Vec<_>>().join("\n")
    };

    if !output.success() && text.trim().is_empty() {
        return format!("{} exited with code {}", output.program, output.exit_code);
    }
    text.trim().to_string()
}

/// `go build` arguments for the given options.
pub(crate) fn build_args(options: &BuildOptions, output: &str, package: &str) -> Vec<String> {
    let mut args = vec!["build".to_string(), "-o".to_string(), output.to_string()];
    if options.static_link {
        args.extend([
            "-tags".to_string(),
            "netgo,osusergo".to_string(),
            "-ldflags".to_string(),
            "-s -w -extldflags=-static".to_string(),
        ]);
    }
    args.extend(options.args.iter().cloned());
    args.push(package.to_string());
    args
}

#[async_trait]
impl GoToolchain for GoCli {
    async fn vet(&self, src: &SourceDir) -> Result<String> {
        self.diagnostics(CommandSpec::new(&self.go, ["vet", "./..."]).current_dir(src.root()))
            .await
    }

    async fn staticcheck(&self, src: &SourceDir) -> Result<String> {
        self.diagnostics(CommandSpec::new("staticcheck", ["./..."]).current_dir(src.root()))
            .await
    }

    async fn test(&self, src: &SourceDir, args: &[String]) -> Result<String> {
        let mut argv = vec!["test".to_string()];
        argv.extend(args.iter().cloned());
        argv.push("./...".to_string());

        let output = self
            .runner
            .run(&CommandSpec::new(&self.go, argv).current_dir(src.root()))
            .await?;
        if !output.success() {
            return Err(ForgeError::CommandFailed {
                program: "go test".to_string(),
                exit_code: output.exit_code,
                stderr: output.combined(),
            });
        }
        Ok(output.combined())
    }

    async fn build(&self, src: &SourceDir, options: &BuildOptions) -> Result<Binary> {
        let out_dir = self.config.artifact_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&out_dir).await?;
        let out_path = out_dir.join(&self.config.binary_name);

        let mut spec = CommandSpec::new(
            &self.go,
            build_args(options, &out_path.to_string_lossy(), &self.config.go_package),
        )
        .current_dir(src.root())
        .env("GOOS", options.platform.os.clone())
        .env("GOARCH", options.platform.arch.clone());
        if options.static_link {
            spec = spec.env("CGO_ENABLED", "0");
        }

        if let Err(e) = self.runner.run_checked(&spec).await {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&out_dir).await {
                warn!(dir = %out_dir.display(), error = %cleanup, "Could not remove build directory");
            }
            return Err(e);
        }
        info!(binary = %out_path.display(), platform = %options.platform, "Built Go binary");

        Ok(Binary {
            path: out_path,
            options: options.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_build_args() {
        let args = build_args(&BuildOptions::static_linux_amd64(), "/out/score-server", "./cmd/score-server");
        assert_eq!(args[..3], ["build", "-o", "/out/score-server"]);
        assert!(args.iter().any(|a| a.contains("-extldflags=-static")));
        assert_eq!(args.last().unwrap(), "./cmd/score-server");
    }

    #[test]
    fn dynamic_build_has_no_link_flags() {
        let mut options = BuildOptions::static_linux_amd64();
        options.static_link = false;
        options.args = vec!["-trimpath".to_string()];
        let args = build_args(&options, "out", "./cmd/score-server");
        assert_eq!(args, ["build", "-o", "out", "-trimpath", "./cmd/score-server"]);
    }

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            program: "go".to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 1,
        }
    }

    #[test]
    fn clean_run_ignores_toolchain_chatter() {
        let out = output(
            0,
            "",
            "go: downloading github.com/gorilla/mux v1.8.0\ngo: finding module for package example.com/x\n",
        );
        assert_eq!(diagnostic_text(&out), "");
    }

    #[test]
    fn failing_run_keeps_diagnostics_without_downloads() {
        let out = output(
            1,
            "",
            "go: downloading github.com/gorilla/mux v1.8.0\n./main.go:12:2: unreachable code\n",
        );
        assert_eq!(diagnostic_text(&out), "./main.go:12:2: unreachable code");
    }

    #[test]
    fn silent_failure_reports_exit_code() {
        let out = output(2, "", "go: downloading github.com/gorilla/mux v1.8.0\n");
        assert_eq!(diagnostic_text(&out), "go exited with code 2");
    }

    #[cfg(unix)]
    mod with_fake_go {
        use super::*;
        use crate::adapters::fake_tool;

        fn go_cli(go: String, artifact_dir: &std::path::Path) -> GoCli {
            let config = ForgeConfig {
                artifact_dir: artifact_dir.to_path_buf(),
                ..ForgeConfig::default()
            };
            GoCli::new(CommandRunner::new(60), Arc::new(config)).with_go_binary(go)
        }

        #[tokio::test]
        async fn vet_with_progress_on_stderr_is_clean() {
            let bin = tempfile::tempdir().unwrap();
            let go = fake_tool(
                bin.path(),
                "go",
                "echo 'go: downloading github.com/gorilla/mux v1.8.0' >&2\nexit 0",
            );
            let src = tempfile::tempdir().unwrap();

            let out = go_cli(go, bin.path())
                .vet(&SourceDir::new(src.path()))
                .await
                .unwrap();
            assert!(out.is_empty(), "unexpected diagnostics: {out:?}");
        }

        #[tokio::test]
        async fn vet_findings_are_returned() {
            let bin = tempfile::tempdir().unwrap();
            let go = fake_tool(
                bin.path(),
                "go",
                "echo '# example.com/score' >&2\necho './main.go:3:1: unreachable code' >&2\nexit 1",
            );
            let src = tempfile::tempdir().unwrap();

            let out = go_cli(go, bin.path())
                .vet(&SourceDir::new(src.path()))
                .await
                .unwrap();
            assert_eq!(out, "# example.com/score\n./main.go:3:1: unreachable code");
        }

        #[tokio::test]
        async fn failed_build_leaves_no_artifacts() {
            let bin = tempfile::tempdir().unwrap();
            let go = fake_tool(bin.path(), "go", "echo 'cannot find package' >&2\nexit 1");
            let artifacts = tempfile::tempdir().unwrap();
            let src = tempfile::tempdir().unwrap();

            let err = go_cli(go, artifacts.path())
                .build(&SourceDir::new(src.path()), &BuildOptions::static_linux_amd64())
                .await
                .unwrap_err();
            assert!(matches!(err, ForgeError::CommandFailed { .. }));
            assert_eq!(std::fs::read_dir(artifacts.path()).unwrap().count(), 0);
        }
    }
}
