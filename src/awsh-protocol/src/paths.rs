//! Runtime file locations.
//!
//! All sockets and the result-channel file live in a per-user directory so
//! concurrent users on one host never collide.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("could not determine the home directory")]
    NoHome,

    #[error("could not create runtime directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolved locations of the awsh runtime files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Directory holding everything below.
    pub root: PathBuf,

    /// Sandbox command socket.
    pub sandbox_socket: PathBuf,

    /// Proxy listening socket the frontend connects to.
    pub proxy_socket: PathBuf,

    /// Backend socket the proxy connects to.
    pub backend_socket: PathBuf,

    /// Result channel file.
    pub result_file: PathBuf,
}

impl RuntimePaths {
    /// Resolve under `~/.awsh/`, creating the directory if needed.
    pub fn resolve() -> Result<Self, PathsError> {
        let home = dirs::home_dir().ok_or(PathsError::NoHome)?;
        Self::under(&home.join(".awsh"))
    }

    /// Resolve under an explicit root. Used by tests and by binaries taking
    /// a `--runtime-dir` override.
    pub fn under(root: &Path) -> Result<Self, PathsError> {
        std::fs::create_dir_all(root).map_err(|source| PathsError::CreateDir {
            path: root.to_owned(),
            source,
        })?;
        Ok(Self {
            root: root.to_owned(),
            sandbox_socket: root.join("sandbox.sock"),
            proxy_socket: root.join("proxy.sock"),
            backend_socket: root.join("backend.sock"),
            result_file: root.join("result.mmap"),
        })
    }

    /// Remove every runtime file that exists. Missing files are not errors;
    /// shutdown may run after a partial startup.
    pub fn remove_all(&self) {
        for path in [
            &self.sandbox_socket,
            &self.proxy_socket,
            &self.backend_socket,
            &self.result_file,
        ] {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_under_explicit_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::under(dir.path()).unwrap();
        assert_eq!(paths.sandbox_socket, dir.path().join("sandbox.sock"));
        assert_eq!(paths.result_file, dir.path().join("result.mmap"));
    }

    #[test]
    fn creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/.awsh");
        let _ = RuntimePaths::under(&root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn remove_all_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::under(dir.path()).unwrap();
        std::fs::write(&paths.result_file, b"x").unwrap();
        paths.remove_all();
        paths.remove_all();
        assert!(!paths.result_file.exists());
    }
}
