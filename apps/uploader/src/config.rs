//! Uploader configuration.
//!
//! Reads JSON at `~/.config/seabee-uploader/config.json`. Every key is
//! optional; missing keys keep the engine defaults. `SEABEE_MOUNT_ROOT` and
//! `SEABEE_BUCKET` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use seabee_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// On-disk config format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mount_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capture_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sync_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sync_remote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bucket_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unmount_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ping_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ping_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probe_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scan_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probe_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_poll_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sidecar_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sidecar_template: Option<PathBuf>,
}

impl ConfigFile {
    fn from_engine(cfg: &EngineConfig) -> Self {
        Self {
            mount_root: Some(cfg.mount_root.clone()),
            media_dir: Some(cfg.media_dir.clone()),
            capture_prefix: Some(cfg.capture_prefix.clone()),
            sync_program: Some(cfg.sync_program.clone()),
            sync_remote: Some(cfg.sync_remote.clone()),
            bucket: Some(cfg.bucket.clone()),
            bucket_prefix: Some(cfg.bucket_prefix.clone()),
            unmount_program: Some(cfg.unmount_program.clone()),
            ping_program: Some(cfg.ping_program.clone()),
            ping_host: Some(cfg.ping_host.clone()),
            probe_timeout_secs: Some(cfg.probe_timeout.as_secs()),
            scan_interval_secs: Some(cfg.scan_interval.as_secs()),
            probe_interval_secs: Some(cfg.probe_interval.as_secs()),
            status_poll_millis: Some(cfg.status_poll_interval.as_millis() as u64),
            sidecar_file_name: Some(cfg.sidecar_file_name.clone()),
            sidecar_template: cfg.sidecar_template.clone(),
        }
    }

    fn apply(self, cfg: &mut EngineConfig) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        fn non_empty(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }
        fn interval(value: Option<u64>, unit: fn(u64) -> Duration) -> Option<Duration> {
            value.filter(|v| *v > 0).map(unit)
        }

        set(&mut cfg.mount_root, self.mount_root);
        set(&mut cfg.media_dir, non_empty(self.media_dir));
        set(&mut cfg.capture_prefix, non_empty(self.capture_prefix));
        set(&mut cfg.sync_program, non_empty(self.sync_program));
        set(&mut cfg.sync_remote, non_empty(self.sync_remote));
        set(&mut cfg.bucket, non_empty(self.bucket));
        // An empty prefix uploads to the bucket root.
        set(&mut cfg.bucket_prefix, self.bucket_prefix);
        set(&mut cfg.unmount_program, non_empty(self.unmount_program));
        set(&mut cfg.ping_program, non_empty(self.ping_program));
        set(&mut cfg.ping_host, non_empty(self.ping_host));
        set(&mut cfg.probe_timeout, interval(self.probe_timeout_secs, Duration::from_secs));
        set(&mut cfg.scan_interval, interval(self.scan_interval_secs, Duration::from_secs));
        set(&mut cfg.probe_interval, interval(self.probe_interval_secs, Duration::from_secs));
        set(
            &mut cfg.status_poll_interval,
            interval(self.status_poll_millis, Duration::from_millis),
        );
        set(&mut cfg.sidecar_file_name, non_empty(self.sidecar_file_name));
        if self.sidecar_template.is_some() {
            cfg.sidecar_template = self.sidecar_template;
        }
    }
}

/// Uploader configuration: the engine settings plus where they live.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub engine: EngineConfig,
    file_path: PathBuf,
}

impl UploaderConfig {
    /// Loads the user config file, writing one with the defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        let file_path = config_file_path();
        let exists = file_path.exists();
        let mut config = Self::load_from(&file_path)?;
        if !exists {
            if let Err(e) = config.save() {
                tracing::warn!(
                    path = %file_path.display(),
                    error = %e,
                    "failed to write default config"
                );
            }
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from `file_path`; a missing or unparsable file
    /// yields the defaults.
    pub fn load_from(file_path: &Path) -> anyhow::Result<Self> {
        let mut config = UploaderConfig {
            engine: EngineConfig::default(),
            file_path: file_path.to_path_buf(),
        };

        if file_path.exists() {
            let content = std::fs::read_to_string(file_path)?;
            match serde_json::from_str::<ConfigFile>(&content) {
                Ok(file) => file.apply(&mut config.engine),
                Err(e) => tracing::warn!(
                    path = %file_path.display(),
                    error = %e,
                    "failed to parse uploader config, using defaults"
                ),
            }
        }

        Ok(config)
    }

    /// Applies `SEABEE_MOUNT_ROOT` and `SEABEE_BUCKET` from `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(root) = var("SEABEE_MOUNT_ROOT").filter(|v| !v.is_empty()) {
            self.engine.mount_root = PathBuf::from(root);
        }
        if let Some(bucket) = var("SEABEE_BUCKET").filter(|v| !v.is_empty()) {
            self.engine.bucket = bucket;
        }
    }

    /// Saves configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&ConfigFile::from_engine(&self.engine))?;
        std::fs::write(&self.file_path, json)?;
        tracing::debug!(path = %self.file_path.display(), "uploader configuration saved");
        Ok(())
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn config_file_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("seabee-uploader")
        .join("config.json")
}
