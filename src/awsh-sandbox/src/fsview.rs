//! Restricted filesystem view for the shell session.
//!
//! Preferred shape is a read-only recursive bind mount of the host root,
//! confined with chroot when the process has the privileges for it. Without
//! CAP_SYS_ADMIN the mount fails with EPERM and the view degrades to a
//! symlink forest, which still gives the shell a working root to resolve
//! binaries from. The degrade is logged, not fatal; validation quality drops
//! but the sandbox stays usable.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{Result, SandboxError};

/// Top-level names never linked into a symlink view.
const SYMLINK_SKIP: &[&str] = &["proc", "sys", "dev", "run", "tmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    BindMount,
    SymlinkView,
}

pub struct FsView {
    view: PathBuf,
    work_dir: PathBuf,
    strategy: Strategy,
}

impl FsView {
    /// Build the view under `root`. Created once at sandbox startup; the
    /// shell's working directory lives in a writable dir next to the view.
    pub fn setup(root: &Path) -> Result<Self> {
        let view = root.join("rootfs");
        let work_dir = root.join("work");
        for dir in [&view, &work_dir] {
            std::fs::create_dir_all(dir).map_err(|source| SandboxError::FsView {
                path: dir.clone(),
                source,
            })?;
        }

        let strategy = match try_bind_mount(&view) {
            Ok(()) => Strategy::BindMount,
            Err(error) => {
                warn!(%error, "bind mount unavailable, degrading to symlink view");
                build_symlink_view(&view)?;
                Strategy::SymlinkView
            }
        };
        info!(view = %view.display(), ?strategy, "filesystem view ready");
        Ok(Self {
            view,
            work_dir,
            strategy,
        })
    }

    /// Where the shell starts.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Chroot into the bind-mounted view. Only possible for a privileged
    /// process over a real mount; otherwise a logged no-op. Returns whether
    /// the process is now rooted inside the view.
    #[cfg(target_os = "linux")]
    pub fn confine_process(&self) -> bool {
        if self.strategy != Strategy::BindMount || !nix::unistd::geteuid().is_root() {
            return false;
        }
        match nix::unistd::chroot(&self.view).and_then(|()| nix::unistd::chdir("/")) {
            Ok(()) => {
                info!("process confined to view root");
                true
            }
            Err(error) => {
                warn!(%error, "chroot into view failed");
                false
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn confine_process(&self) -> bool {
        false
    }

    /// Undo the view. Missing pieces are ignored; teardown may run after a
    /// partial setup.
    pub fn teardown(&self) {
        match self.strategy {
            Strategy::BindMount => {
                #[cfg(target_os = "linux")]
                if let Err(error) =
                    nix::mount::umount2(&self.view, nix::mount::MntFlags::MNT_DETACH)
                {
                    warn!(%error, "could not unmount view");
                }
            }
            Strategy::SymlinkView => {
                let _ = std::fs::remove_dir_all(&self.view);
            }
        }
        let _ = std::fs::remove_dir_all(&self.work_dir);
    }
}

impl Drop for FsView {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(target_os = "linux")]
fn try_bind_mount(view: &Path) -> std::io::Result<()> {
    use nix::mount::{mount, MsFlags};
    let to_io = |e: nix::Error| std::io::Error::from_raw_os_error(e as i32);
    mount(
        Some(Path::new("/")),
        view,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(to_io)?;
    // A plain bind ignores MS_RDONLY; the remount applies it.
    mount(
        None::<&Path>,
        view,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None::<&str>,
    )
    .map_err(to_io)
}

#[cfg(not(target_os = "linux"))]
fn try_bind_mount(_view: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "bind mounts are linux-only",
    ))
}

/// Link each top-level host directory into the view.
fn build_symlink_view(view: &Path) -> Result<()> {
    let entries = std::fs::read_dir("/").map_err(|source| SandboxError::FsView {
        path: PathBuf::from("/"),
        source,
    })?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name_str) = name.to_str() else {
            continue;
        };
        if SYMLINK_SKIP.contains(&name_str) {
            continue;
        }
        let link = view.join(&name);
        if link.exists() {
            continue;
        }
        if let Err(error) = std::os::unix::fs::symlink(entry.path(), &link) {
            warn!(%error, name = name_str, "could not link host entry into view");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symlink_view_links_host_roots() {
        let dir = tempfile::tempdir().unwrap();
        let view = dir.path().join("rootfs");
        std::fs::create_dir_all(&view).unwrap();
        build_symlink_view(&view).unwrap();

        let usr = view.join("usr");
        if Path::new("/usr").exists() {
            assert!(usr.symlink_metadata().unwrap().file_type().is_symlink());
        }
        assert!(!view.join("proc").exists());
        assert!(!view.join("sys").exists());
    }

    #[test]
    fn teardown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let view = FsView {
            view: dir.path().join("rootfs"),
            work_dir: dir.path().join("work"),
            strategy: Strategy::SymlinkView,
        };
        view.teardown();
        view.teardown();
    }
}
