//! Mission metadata sidecars.
//!
//! After a copy, every mission folder on the target gets a small YAML
//! document merging a default template with the folder's file count and an
//! empty capture timestamp for the processing pipeline to fill in.

use std::path::{Path, PathBuf};

use seabee_discovery::DeviceScanner;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::TransferError;

/// File name of the sidecar written into each mission folder.
pub const DEFAULT_SIDECAR_NAME: &str = "config.seabee.yaml";

/// Built-in template used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("sidecar_template.yaml");

const FILE_COUNT_KEY: &str = "nfiles";
const CAPTURED_AT_KEY: &str = "datetime";

/// Metadata document for one mission folder.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionSidecar {
    pub file_count: usize,
    /// Left empty; filled in downstream.
    pub captured_at: String,
    pub template: Mapping,
}

impl MissionSidecar {
    /// Template fields with the per-folder fields laid over them.
    pub fn to_mapping(&self) -> Mapping {
        let mut doc = self.template.clone();
        doc.insert(
            Value::from(FILE_COUNT_KEY),
            Value::from(self.file_count as u64),
        );
        doc.insert(
            Value::from(CAPTURED_AT_KEY),
            Value::from(self.captured_at.clone()),
        );
        doc
    }

    pub fn to_yaml(&self) -> Result<String, TransferError> {
        Ok(serde_yaml::to_string(&self.to_mapping())?)
    }
}

/// Writes sidecars into mission folders.
#[derive(Debug, Clone)]
pub struct SidecarWriter {
    file_name: String,
    template: Mapping,
    scanner: DeviceScanner,
}

impl Default for SidecarWriter {
    fn default() -> Self {
        Self::new(DEFAULT_SIDECAR_NAME, default_template(), DeviceScanner::default())
    }
}

impl SidecarWriter {
    pub fn new(file_name: impl Into<String>, template: Mapping, scanner: DeviceScanner) -> Self {
        Self {
            file_name: file_name.into(),
            template,
            scanner,
        }
    }

    /// Loads a template from `path`, falling back to the built-in one.
    pub fn load_template(path: Option<&Path>) -> Mapping {
        let Some(path) = path else {
            return default_template();
        };
        match std::fs::read_to_string(path)
            .map_err(TransferError::from)
            .and_then(|text| serde_yaml::from_str::<Mapping>(&text).map_err(TransferError::from))
        {
            Ok(template) => template,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to load sidecar template, using built-in default"
                );
                default_template()
            }
        }
    }

    /// Counts regular files directly inside `folder`, excluding the sidecar.
    pub fn count_files(&self, folder: &Path) -> Result<usize, TransferError> {
        let mut count = 0;
        for entry in std::fs::read_dir(folder)? {
            let entry = entry?;
            if entry.file_name().to_str() == Some(self.file_name.as_str()) {
                continue;
            }
            if entry.metadata()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Writes (or overwrites) the sidecar for one mission folder.
    pub fn write(&self, folder: &Path) -> Result<PathBuf, TransferError> {
        let sidecar = MissionSidecar {
            file_count: self.count_files(folder)?,
            captured_at: String::new(),
            template: self.template.clone(),
        };
        let path = folder.join(&self.file_name);
        std::fs::write(&path, sidecar.to_yaml()?)?;
        debug!(
            path = %path.display(),
            files = sidecar.file_count,
            "sidecar written"
        );
        Ok(path)
    }

    /// Writes a sidecar into every mission folder a copy from `source_media`
    /// delivered to `target`.
    ///
    /// Failures are logged per folder and never abort the rest. Returns the
    /// paths written.
    pub fn write_for_copy(&self, source_media: &Path, target: &Path) -> Vec<PathBuf> {
        let missions = match self.scanner.mission_folders(source_media) {
            Ok(missions) => missions,
            Err(e) => {
                warn!(error = %e, "failed to list copied mission folders, no sidecars written");
                return Vec::new();
            }
        };

        let mut written = Vec::new();
        for mission in missions {
            let Some(name) = mission.file_name() else {
                continue;
            };
            let folder = target.join(name);
            if !folder.is_dir() {
                warn!(folder = %folder.display(), "mission folder missing after copy");
                continue;
            }
            match self.write(&folder) {
                Ok(path) => written.push(path),
                Err(e) => {
                    warn!(folder = %folder.display(), error = %e, "failed to write sidecar");
                }
            }
        }

        info!(
            target = %target.display(),
            count = written.len(),
            "mission sidecars written"
        );
        written
    }
}

fn default_template() -> Mapping {
    serde_yaml::from_str(DEFAULT_TEMPLATE).unwrap_or_default()
}
