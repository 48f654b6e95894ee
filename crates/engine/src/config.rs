//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use seabee_discovery::{DEFAULT_MOUNT_ROOT, ScanLayout};
use seabee_transfer::{DEFAULT_SIDECAR_NAME, SyncSettings};

/// Every tunable of the engine. `Default` matches the field unit setup.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory whose children are the mounted media.
    pub mount_root: PathBuf,
    pub media_dir: String,
    pub capture_prefix: String,

    pub sync_program: String,
    pub sync_remote: String,
    pub bucket: String,
    pub bucket_prefix: String,
    pub unmount_program: String,

    pub ping_program: String,
    pub ping_host: String,
    pub probe_timeout: Duration,

    pub scan_interval: Duration,
    pub probe_interval: Duration,
    pub status_poll_interval: Duration,

    pub sidecar_file_name: String,
    /// YAML template merged into every sidecar; built-in default when unset.
    pub sidecar_template: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let layout = ScanLayout::default();
        let sync = SyncSettings::default();
        Self {
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            media_dir: layout.media_dir,
            capture_prefix: layout.capture_prefix,
            sync_program: sync.sync_program,
            sync_remote: sync.remote,
            bucket: sync.bucket,
            bucket_prefix: sync.bucket_prefix,
            unmount_program: sync.unmount_program,
            ping_program: "ping".into(),
            ping_host: seabee_connectivity::DEFAULT_PING_HOST.into(),
            probe_timeout: Duration::from_secs(3),
            scan_interval: Duration::from_secs(5),
            probe_interval: Duration::from_secs(10),
            status_poll_interval: Duration::from_millis(100),
            sidecar_file_name: DEFAULT_SIDECAR_NAME.into(),
            sidecar_template: None,
        }
    }
}

impl EngineConfig {
    pub fn scan_layout(&self) -> ScanLayout {
        ScanLayout {
            media_dir: self.media_dir.clone(),
            capture_prefix: self.capture_prefix.clone(),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            sync_program: self.sync_program.clone(),
            remote: self.sync_remote.clone(),
            bucket: self.bucket.clone(),
            bucket_prefix: self.bucket_prefix.clone(),
            unmount_program: self.unmount_program.clone(),
            media_dir: self.media_dir.clone(),
        }
    }
}
