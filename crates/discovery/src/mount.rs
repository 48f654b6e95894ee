//! Mount point detection.

use std::io;
use std::path::Path;

/// Returns whether `path` is the root of a mounted filesystem.
///
/// A directory is a mount point when it lives on a different device than
/// its parent, or when it is its own parent (`/`). Symlinks never are.
#[cfg(unix)]
pub fn is_mount_point(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() || !meta.is_dir() {
        return Ok(false);
    }
    let parent = std::fs::metadata(path.join(".."))?;
    Ok(meta.dev() != parent.dev() || meta.ino() == parent.ino())
}

/// Returns whether `path` is the root of a mounted filesystem.
///
/// Without device numbers every directory under the mount root is treated
/// as mounted.
#[cfg(not(unix))]
pub fn is_mount_point(path: &Path) -> io::Result<bool> {
    Ok(std::fs::metadata(path)?.is_dir())
}
