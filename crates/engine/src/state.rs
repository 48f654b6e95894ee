//! Engine state owned by the orchestrator.

use seabee_protocol::{DeviceSnapshot, EngineSnapshot, PipelineEvent, TransferStatus};
use tracing::info;

/// Process-wide engine state.
///
/// Only the orchestrator mutates it; everyone else gets an
/// [`EngineSnapshot`] copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub transfer_active: bool,
    pub devices: DeviceSnapshot,
    pub source_safe_to_remove: bool,
    /// Status of the current or most recent run.
    pub transfer: Option<TransferStatus>,
    pub internet_connected: bool,
}

impl EngineState {
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            devices: self.devices.clone(),
            source_safe_to_remove: self.source_safe_to_remove,
            progress: self.transfer.as_ref().and_then(|t| t.progress.clone()),
            transfer: self.transfer.clone(),
            transfer_active: self.transfer_active,
            internet_connected: self.internet_connected,
        }
    }

    /// Replaces the device snapshot wholesale. Returns whether it changed.
    ///
    /// A detached source stays detached until its path disappears or changes.
    pub fn apply_scan(&mut self, devices: DeviceSnapshot) -> bool {
        if self.source_safe_to_remove && devices.source_path != self.devices.source_path {
            self.source_safe_to_remove = false;
        }
        if self.devices == devices {
            return false;
        }
        info!(
            source = ?devices.source_path,
            source_missions = devices.source_mission_count,
            source_manual = devices.source_manual_count,
            target = ?devices.target_path,
            target_missions = devices.target_mission_count,
            target_manual = devices.target_manual_count,
            "devices changed"
        );
        self.devices = devices;
        true
    }

    /// Applies a status drained from the mailbox.
    ///
    /// A terminal status ends the active transfer.
    pub fn apply_status(&mut self, status: TransferStatus) {
        if status.source_detached {
            self.source_safe_to_remove = true;
        }
        if status.is_terminal() {
            self.transfer_active = false;
            info!(message = %status.message(), "transfer ended");
        }
        self.transfer = Some(status);
    }

    /// Ends a run whose task stopped without a final status.
    ///
    /// The status is marked failed at its current step, if one started.
    pub fn abandon_transfer(&mut self, reason: &str) {
        self.transfer_active = false;
        if let Some(status) = self.transfer.as_mut().filter(|s| !s.is_terminal()) {
            if let Some(step) = status.step.clone() {
                status.apply(&PipelineEvent::AllFailed {
                    step,
                    reason: reason.to_string(),
                });
            }
        }
    }

    /// Records connectivity. Returns whether it changed.
    pub fn set_connected(&mut self, connected: bool) -> bool {
        let changed = self.internet_connected != connected;
        self.internet_connected = connected;
        changed
    }
}
