//! Shared data model for the SeaBee field uploader.
//!
//! These types cross every crate boundary: the device scanner produces
//! [`DeviceSnapshot`]s, the command pipeline emits [`PipelineEvent`]s, and
//! the engine hands [`EngineSnapshot`]s to whatever presentation layer is
//! polling it. Everything serializes to camelCase JSON.

pub mod events;
pub mod types;

pub use events::{EngineSnapshot, PipelineEvent, RunOutcome, TransferStatus};
pub use types::{
    DeviceSnapshot, ParseActionError, PipelineStep, ProgressSample, TransferAction,
};
