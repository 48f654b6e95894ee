use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Result of one device scan.
///
/// Recomputed wholesale on every scan; nothing carries over between scans
/// except the path strings themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub source_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    pub source_mission_count: usize,
    pub source_manual_count: usize,
    pub target_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,
    pub target_mission_count: usize,
    pub target_manual_count: usize,
}

/// A named action the front end can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferAction {
    /// Stage the card's media onto the target drive.
    CopyOnly,
    /// Push the target drive's contents to the bucket.
    UploadOnly,
    /// Copy, unmount the card, then upload.
    CopyAndUpload,
}

impl TransferAction {
    /// All actions, in the order a front end would list them.
    pub const ALL: [TransferAction; 3] = [
        TransferAction::CopyOnly,
        TransferAction::UploadOnly,
        TransferAction::CopyAndUpload,
    ];

    /// Short name used for triggering the action by name.
    pub fn name(self) -> &'static str {
        match self {
            TransferAction::CopyOnly => "copy",
            TransferAction::UploadOnly => "upload",
            TransferAction::CopyAndUpload => "both",
        }
    }

    /// Whether the action reads from the source card.
    pub fn requires_source(self) -> bool {
        matches!(
            self,
            TransferAction::CopyOnly | TransferAction::CopyAndUpload
        )
    }

    /// Whether the action reads from or writes to the target drive.
    ///
    /// Every action does.
    pub fn requires_target(self) -> bool {
        true
    }
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when an action name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0:?}")]
pub struct ParseActionError(pub String);

impl FromStr for TransferAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" | "copy-only" | "copyonly" => Ok(TransferAction::CopyOnly),
            "upload" | "upload-only" | "uploadonly" => Ok(TransferAction::UploadOnly),
            "both" | "copy-and-upload" | "copyandupload" => Ok(TransferAction::CopyAndUpload),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}

/// One step of a pipeline run. Immutable once the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PipelineStep {
    #[serde(rename_all = "camelCase")]
    Copy { from: PathBuf, to: PathBuf },
    #[serde(rename_all = "camelCase")]
    Unmount { path: PathBuf },
    #[serde(rename_all = "camelCase")]
    Upload { from: PathBuf, bucket_path: String },
}

impl PipelineStep {
    /// Short identifier used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineStep::Copy { .. } => "copy",
            PipelineStep::Unmount { .. } => "unmount",
            PipelineStep::Upload { .. } => "upload",
        }
    }

    /// Human-readable description shown while the step runs.
    pub fn label(&self) -> String {
        match self {
            PipelineStep::Copy { from, to } => {
                format!("Copying {} to {}", from.display(), to.display())
            }
            PipelineStep::Unmount { path } => format!("Unmounting {}", path.display()),
            PipelineStep::Upload { from, bucket_path } => {
                format!("Uploading {} to {bucket_path}", from.display())
            }
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Transfer metrics scraped from one line of sync-tool output.
///
/// Every field is an opaque display string exactly as the tool printed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    pub transferred: String,
    pub total: String,
    pub percent: String,
    pub speed: String,
    pub eta: String,
}

impl ProgressSample {
    /// Renders the sample as the three status lines shown under a step label.
    pub fn display_lines(&self) -> String {
        format!(
            "Transferred: {} / {} ({})\nSpeed: {}\nETA: {}",
            self.transferred, self.total, self.percent, self.speed, self.eta
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_roundtrip() {
        for action in TransferAction::ALL {
            assert_eq!(action.name().parse::<TransferAction>(), Ok(action));
        }
    }

    #[test]
    fn action_parse_aliases() {
        assert_eq!(
            "Copy-And-Upload".parse::<TransferAction>(),
            Ok(TransferAction::CopyAndUpload)
        );
        assert_eq!(
            " upload-only ".parse::<TransferAction>(),
            Ok(TransferAction::UploadOnly)
        );
        assert!("format".parse::<TransferAction>().is_err());
    }

    #[test]
    fn action_requirements() {
        assert!(TransferAction::CopyOnly.requires_source());
        assert!(TransferAction::CopyAndUpload.requires_source());
        assert!(!TransferAction::UploadOnly.requires_source());
        assert!(TransferAction::UploadOnly.requires_target());
    }

    #[test]
    fn step_labels() {
        let copy = PipelineStep::Copy {
            from: "/media/pi/SD/DCIM".into(),
            to: "/media/pi/USB".into(),
        };
        assert_eq!(copy.label(), "Copying /media/pi/SD/DCIM to /media/pi/USB");

        let unmount = PipelineStep::Unmount {
            path: "/media/pi/SD".into(),
        };
        assert_eq!(unmount.to_string(), "Unmounting /media/pi/SD");

        let upload = PipelineStep::Upload {
            from: "/media/pi/USB".into(),
            bucket_path: "minio:seabirds/fielduploads".into(),
        };
        assert_eq!(
            upload.label(),
            "Uploading /media/pi/USB to minio:seabirds/fielduploads"
        );
        assert_eq!(upload.kind(), "upload");
    }

    #[test]
    fn step_serialization_is_tagged() {
        let step = PipelineStep::Upload {
            from: "/mnt/usb".into(),
            bucket_path: "minio:b/p".into(),
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"kind\":\"upload\""));
        assert!(json.contains("\"bucketPath\":\"minio:b/p\""));
    }

    #[test]
    fn snapshot_skips_absent_paths() {
        let snap = DeviceSnapshot::default();
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("sourcePath"));
        assert!(json.contains("\"targetPresent\":false"));
    }

    #[test]
    fn sample_display_lines() {
        let sample = ProgressSample {
            transferred: "1.5 GiB".into(),
            total: "3 GiB".into(),
            percent: "50%".into(),
            speed: "20.1 MiB/s".into(),
            eta: "1m16s".into(),
        };
        assert_eq!(
            sample.display_lines(),
            "Transferred: 1.5 GiB / 3 GiB (50%)\nSpeed: 20.1 MiB/s\nETA: 1m16s"
        );
    }
}
