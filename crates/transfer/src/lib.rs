//! Transfer pipeline: copy, unmount, upload.
//!
//! The actual data movement is delegated to an external sync tool
//! (`rclone`). This crate builds the step list for a requested action, runs
//! each step's command to completion one after the other, scrapes progress
//! from the merged output, and writes a metadata sidecar into every mission
//! folder a copy delivered.

mod pipeline;
mod progress;
mod runner;
mod sidecar;

pub use pipeline::{CommandPipeline, SyncSettings};
pub use progress::{ProgressParser, RcloneProgressParser};
pub use runner::{CommandRunner, CommandSpec, RunFuture, SystemRunner};
pub use sidecar::{DEFAULT_SIDECAR_NAME, DEFAULT_TEMPLATE, MissionSidecar, SidecarWriter};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("step \"{step}\" failed: {reason}")]
    StepFailed { step: String, reason: String },
}
