//! Version-control metadata via the `git` CLI.

use async_trait::async_trait;
use regex::Regex;

use crate::artifact::CommitQuery;
use crate::collaborators::VcsReader;
use crate::error::{ForgeError, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::source::SourceDir;

pub struct GitCli {
    runner: CommandRunner,
}

impl GitCli {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    async fn git(&self, src: &SourceDir, args: &[&str]) -> Result<String> {
        self.runner
            .run_checked(&CommandSpec::new("git", args.iter().copied()).current_dir(src.root()))
            .await
    }
}

/// Repository name from a remote URL (`git@host:org/name.git`, `https://host/org/name`).
pub(crate) fn repo_name_from_url(url: &str) -> Option<String> {
    let re = Regex::new(r"[:/]([^/:]+?)(?:\.git)?/?$").ok()?;
    re.captures(url.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl VcsReader for GitCli {
    async fn commit(&self, src: &SourceDir, query: CommitQuery) -> Result<String> {
        if !query.ignore_dirty {
            let status = self.git(src, &["status", "--porcelain"]).await?;
            if !status.is_empty() {
                return Err(ForgeError::DirtyWorkTree(src.root().to_path_buf()));
            }
        }
        if query.short {
            self.git(src, &["rev-parse", "--short", "HEAD"]).await
        } else {
            self.git(src, &["rev-parse", "HEAD"]).await
        }
    }

    async fn repo_name(&self, src: &SourceDir) -> Result<String> {
        if let Ok(url) = self.git(src, &["config", "--get", "remote.origin.url"]).await {
            if let Some(name) = repo_name_from_url(&url) {
                return Ok(name);
            }
        }
        let toplevel = self.git(src, &["rev-parse", "--show-toplevel"]).await?;
        Ok(std::path::Path::new(&toplevel)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default())
    }

    async fn branch(&self, src: &SourceDir) -> Result<String> {
        self.git(src, &["rev-parse", "--abbrev-ref", "HEAD"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["remote", "add", "origin", "git@github.com:fbs-tech-summit/score-server.git"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn parses_repo_names() {
        assert_eq!(
            repo_name_from_url("git@github.com:fbs-tech-summit/score-server.git").as_deref(),
            Some("score-server")
        );
        assert_eq!(
            repo_name_from_url("https://github.com/fbs-tech-summit/score-server").as_deref(),
            Some("score-server")
        );
        assert_eq!(
            repo_name_from_url("https://github.com/fbs-tech-summit/score-server/").as_deref(),
            Some("score-server")
        );
        assert_eq!(repo_name_from_url("score-server"), None);
    }

    #[tokio::test]
    async fn reads_metadata_from_repo() {
        let repo = make_git_repo();
        let git = GitCli::new(CommandRunner::new(60));
        let src = SourceDir::new(repo.path());

        let sha = git
            .commit(&src, CommitQuery { short: true, ignore_dirty: true })
            .await
            .unwrap();
        assert!(!sha.is_empty() && sha.len() < 40);
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(git.repo_name(&src).await.unwrap(), "score-server");
        assert_eq!(git.branch(&src).await.unwrap(), "main");
    }

    #[tokio::test]
    async fn dirty_tree_fails_unless_ignored() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("main.go"), "package main\n").unwrap();
        let git = GitCli::new(CommandRunner::new(60));
        let src = SourceDir::new(repo.path());

        let err = git
            .commit(&src, CommitQuery { short: true, ignore_dirty: false })
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::DirtyWorkTree(ref path) if path == repo.path()));
        let full = git
            .commit(&src, CommitQuery { short: false, ignore_dirty: true })
            .await
            .unwrap();
        assert_eq!(full.len(), 40);
    }

    #[tokio::test]
    async fn fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(CommandRunner::new(60));
        let src = SourceDir::new(dir.path());
        assert!(git.branch(&src).await.is_err());
    }
}
