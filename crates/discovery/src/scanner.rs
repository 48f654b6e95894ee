//! Device scanner.
//!
//! Walks the immediate children of a mount root once per call. The first
//! child holding capture folders under the media directory is the source;
//! the first mounted child without a media directory is the target. Source
//! captures live under `<mount>/DCIM/DJI_*`, target captures directly under
//! `<mount>/DJI_*` because the copy step flattens the media directory away.

use std::io;
use std::path::{Path, PathBuf};

use seabee_protocol::DeviceSnapshot;
use tracing::debug;

use crate::DiscoveryError;
use crate::mount::is_mount_point;
use crate::naming::{CaptureCounts, CaptureKind, classify};

/// Decides whether a directory is an active mount point.
pub type MountCheck = fn(&Path) -> io::Result<bool>;

/// Directory naming used to recognize capture media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLayout {
    /// Directory on the card that holds capture folders.
    pub media_dir: String,
    /// Manufacturer prefix every capture folder starts with.
    pub capture_prefix: String,
}

impl Default for ScanLayout {
    fn default() -> Self {
        Self {
            media_dir: "DCIM".into(),
            capture_prefix: "DJI_".into(),
        }
    }
}

/// Classifies mounted media into source and target.
#[derive(Debug, Clone)]
pub struct DeviceScanner {
    layout: ScanLayout,
    mount_check: MountCheck,
}

impl Default for DeviceScanner {
    fn default() -> Self {
        Self::new(ScanLayout::default())
    }
}

impl DeviceScanner {
    pub fn new(layout: ScanLayout) -> Self {
        Self {
            layout,
            mount_check: is_mount_point,
        }
    }

    /// Replaces the mount point test.
    pub fn with_mount_check(mut self, mount_check: MountCheck) -> Self {
        self.mount_check = mount_check;
        self
    }

    /// Scans `mount_root` and builds a fresh snapshot.
    ///
    /// Any I/O failure aborts the whole scan; callers keep their previous
    /// snapshot in that case.
    pub fn scan(&self, mount_root: &Path) -> Result<DeviceSnapshot, DiscoveryError> {
        if !mount_root.is_dir() {
            return Err(DiscoveryError::MountRootMissing(mount_root.to_path_buf()));
        }

        let mut snapshot = DeviceSnapshot::default();

        for path in sorted_children(mount_root)? {
            let meta = std::fs::metadata(&path).map_err(|e| DiscoveryError::io(&path, e))?;
            if !meta.is_dir() {
                continue;
            }

            let media = path.join(&self.layout.media_dir);
            let is_card = media.is_dir();

            if is_card && !snapshot.source_present {
                let folders = self.capture_folders(&media)?;
                if !folders.is_empty() {
                    let counts = counts_for(&folders);
                    debug!(
                        path = %path.display(),
                        missions = counts.missions,
                        manual = counts.manual,
                        "source card found"
                    );
                    snapshot.source_present = true;
                    snapshot.source_path = Some(path);
                    snapshot.source_mission_count = counts.missions;
                    snapshot.source_manual_count = counts.manual;
                    continue;
                }
            }

            // Cards are never staging drives, even blank or second ones.
            if is_card {
                debug!(path = %path.display(), "ignoring card as target");
                continue;
            }

            let mounted = (self.mount_check)(&path).map_err(|e| DiscoveryError::io(&path, e))?;
            if !mounted {
                continue;
            }
            if snapshot.target_present {
                debug!(path = %path.display(), "ignoring additional mounted drive");
                continue;
            }

            let counts = self.count_captures(&path)?;
            debug!(
                path = %path.display(),
                missions = counts.missions,
                manual = counts.manual,
                "target drive found"
            );
            snapshot.target_present = true;
            snapshot.target_path = Some(path);
            snapshot.target_mission_count = counts.missions;
            snapshot.target_manual_count = counts.manual;
        }

        Ok(snapshot)
    }

    /// Capture folders directly inside `dir`, sorted by name.
    pub fn capture_folders(&self, dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut folders = Vec::new();
        for path in sorted_children(dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&self.layout.capture_prefix) {
                continue;
            }
            let meta = std::fs::metadata(&path).map_err(|e| DiscoveryError::io(&path, e))?;
            if meta.is_dir() {
                folders.push(path);
            }
        }
        Ok(folders)
    }

    /// Mission-pattern capture folders directly inside `dir`.
    pub fn mission_folders(&self, dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
        Ok(self
            .capture_folders(dir)?
            .into_iter()
            .filter(|path| folder_kind(path) == CaptureKind::Mission)
            .collect())
    }

    /// Tallies capture folders directly inside `dir`.
    pub fn count_captures(&self, dir: &Path) -> Result<CaptureCounts, DiscoveryError> {
        Ok(counts_for(&self.capture_folders(dir)?))
    }
}

fn folder_kind(path: &Path) -> CaptureKind {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(classify)
        .unwrap_or(CaptureKind::Unrecognized)
}

fn counts_for(folders: &[PathBuf]) -> CaptureCounts {
    let mut counts = CaptureCounts::default();
    for folder in folders {
        counts.record(folder_kind(folder));
    }
    counts
}

/// Immediate children of `dir`, sorted so repeated scans agree.
fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DiscoveryError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DiscoveryError::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
