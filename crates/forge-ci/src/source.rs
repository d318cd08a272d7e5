//! Source directory snapshots.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Directory holding the pipeline's own configuration, never part of the source.
pub const PIPELINE_DIR: &str = ".forge";

/// A project tree handed to a pipeline run.
///
/// Top-level entries named in `ignore` are invisible to the snapshot digest and
/// to collaborators that copy the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDir {
    root: PathBuf,
    ignore: Vec<String>,
}

impl SourceDir {
    /// Snapshot of `root` excluding the pipeline directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore: vec![PIPELINE_DIR.to_string()],
        }
    }

    /// Snapshot of `root` with an explicit ignore list.
    pub fn with_ignore(root: impl Into<PathBuf>, ignore: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignore,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }

    /// Whether a path relative to the root is excluded.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .map(|first| self.ignore.iter().any(|i| i == first))
            .unwrap_or(false)
    }

    /// SHA-256 over sorted relative paths and file contents, as lowercase hex.
    ///
    /// `.git` is skipped along with the ignore list.
    pub fn digest(&self) -> Result<String> {
        let mut files = Vec::new();
        self.collect_files(&self.root, &mut files)?;
        files.sort();

        let mut hasher = Sha256::new();
        for relative in files {
            let mut file = fs::File::open(self.root.join(&relative))?;
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            io::copy(&mut file, &mut hasher)?;
            hasher.update(b"\0");
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();
            if relative.as_os_str() == ".git" || self.is_ignored(&relative) {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect_files(&path, out)?;
            } else if file_type.is_file() {
                out.push(relative);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn default_snapshot_ignores_pipeline_dir() {
        let src = SourceDir::new("/repo");
        assert!(src.is_ignored(Path::new(".forge/src/index.ts")));
        assert!(!src.is_ignored(Path::new("cmd/score-server/main.go")));
        assert!(!src.is_ignored(Path::new("pkg/.forge")));
    }

    #[test]
    fn digest_ignores_pipeline_changes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "cmd/score-server/main.go", "package main\n");
        let src = SourceDir::new(dir.path());
        let before = src.digest().unwrap();

        write(dir.path(), ".forge/forge.json", "{}");
        assert_eq!(src.digest().unwrap(), before);

        write(dir.path(), "pkg/score/server.go", "package score\n");
        assert_ne!(src.digest().unwrap(), before);
    }

    #[test]
    fn digest_is_stable_hex() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "go.mod", "module example.com/score\n");
        let src = SourceDir::new(dir.path());
        let digest = src.digest().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, src.digest().unwrap());
    }

    #[test]
    fn digest_covers_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let blob = "0123456789abcdef".repeat(64 * 1024);
        write(dir.path(), "assets/scores.bin", &blob);

        let mut expected = Sha256::new();
        expected.update(Path::new("assets").join("scores.bin").to_string_lossy().as_bytes());
        expected.update(b"\0");
        expected.update(blob.as_bytes());
        expected.update(b"\0");

        let src = SourceDir::new(dir.path());
        assert_eq!(src.digest().unwrap(), hex::encode(expected.finalize()));
    }

    #[test]
    fn digest_fails_for_missing_root() {
        let src = SourceDir::new("/definitely/not/here");
        assert!(src.digest().is_err());
    }
}
