//! Removable media discovery.
//!
//! Classifies the directories under a mount root into a *source* (a flight
//! controller card carrying captures under `DCIM/DJI_*`) and a *target*
//! (any other mounted drive), and counts mission/manual capture folders by
//! their naming convention.

pub mod mount;
pub mod naming;
pub mod scanner;

use std::path::PathBuf;

pub use mount::is_mount_point;
pub use naming::{CaptureCounts, CaptureKind, classify};
pub use scanner::{DeviceScanner, MountCheck, ScanLayout};

/// Default mount location for removable media on the field unit.
pub const DEFAULT_MOUNT_ROOT: &str = "/media/pi";

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mount root is not a directory: {}", .0.display())]
    MountRootMissing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DiscoveryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiscoveryError::Io {
            path: path.into(),
            source,
        }
    }
}
