//! Collaborators backed by locally installed command-line tools.

mod docker;
mod git;
mod go;

pub use docker::{DockerPackager, DockerRegistry, DockerServiceRuntime};
pub use git::GitCli;
pub use go::GoCli;

/// Write an executable shell script standing in for a CLI tool.
#[cfg(all(test, unix))]
pub(crate) fn fake_tool(dir: &std::path::Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}
