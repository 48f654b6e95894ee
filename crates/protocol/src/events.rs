//! Pipeline events and the render-ready snapshots built from them.

use serde::{Deserialize, Serialize};

use crate::types::{DeviceSnapshot, PipelineStep, ProgressSample, TransferAction};

/// Emitted by the command pipeline while a run progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    StepStarted {
        index: usize,
        step: PipelineStep,
    },
    Progress {
        sample: ProgressSample,
    },
    #[serde(rename_all = "camelCase")]
    StepFinished {
        index: usize,
        step: PipelineStep,
        exit_code: Option<i32>,
    },
    AllFinished,
    AllFailed {
        step: PipelineStep,
        reason: String,
    },
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum RunOutcome {
    Finished,
    Failed { step: PipelineStep, reason: String },
}

/// Cumulative view of one pipeline run.
///
/// Each published status carries everything a consumer needs, so dropping
/// intermediate values in the status mailbox never loses information other
/// than superseded progress samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatus {
    pub action: TransferAction,
    pub step_count: usize,
    pub step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<PipelineStep>,
    /// Sticky: survives non-matching output lines, cleared when a step starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSample>,
    pub step_completed: bool,
    pub source_detached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

impl TransferStatus {
    pub fn new(action: TransferAction, step_count: usize) -> Self {
        Self {
            action,
            step_count,
            step_index: 0,
            step: None,
            progress: None,
            step_completed: false,
            source_detached: false,
            outcome: None,
        }
    }

    /// Folds one pipeline event into the status.
    pub fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StepStarted { index, step } => {
                self.step_index = *index;
                self.step = Some(step.clone());
                self.progress = None;
                self.step_completed = false;
            }
            PipelineEvent::Progress { sample } => {
                self.progress = Some(sample.clone());
            }
            PipelineEvent::StepFinished { step, .. } => {
                self.step_completed = true;
                if matches!(step, PipelineStep::Unmount { .. }) {
                    self.source_detached = true;
                }
            }
            PipelineEvent::AllFinished => {
                self.outcome = Some(RunOutcome::Finished);
            }
            PipelineEvent::AllFailed { step, reason } => {
                self.outcome = Some(RunOutcome::Failed {
                    step: step.clone(),
                    reason: reason.clone(),
                });
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Text block a front end shows in its output area.
    pub fn message(&self) -> String {
        if let Some(RunOutcome::Failed { step, reason }) = &self.outcome {
            return format!("Transfer failed at step \"{step}\": {reason}");
        }

        let mut text = match &self.step {
            Some(step) => step.label(),
            None => format!("Starting {}", self.action),
        };
        if let Some(sample) = &self.progress {
            text.push('\n');
            text.push_str(&sample.display_lines());
        }
        if self.step_completed {
            text.push_str("\nCommand completed");
        }
        if matches!(self.outcome, Some(RunOutcome::Finished)) {
            text.push_str("\nAll steps finished");
        }
        text
    }
}

/// Render-ready view of the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub devices: DeviceSnapshot,
    /// Set after an unmount step until the next scan replaces `devices`.
    pub source_safe_to_remove: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferStatus>,
    pub transfer_active: bool,
    pub internet_connected: bool,
}

impl EngineSnapshot {
    /// Actions a front end may currently offer.
    pub fn available_actions(&self) -> Vec<TransferAction> {
        if self.transfer_active {
            return Vec::new();
        }
        let source = self.devices.source_present && !self.source_safe_to_remove;
        let target = self.devices.target_present;
        TransferAction::ALL
            .into_iter()
            .filter(|action| {
                (!action.requires_source() || source) && (!action.requires_target() || target)
            })
            .collect()
    }

    /// Output text of the current or most recent run.
    pub fn status_message(&self) -> Option<String> {
        self.transfer.as_ref().map(TransferStatus::message)
    }
}
