//! Sequential command pipeline.
//!
//! Steps run strictly one after another: a step starts only after the
//! previous step's process has exited, because each step consumes what the
//! one before it produced. There are no retries and no rollback; the first
//! failing copy or upload ends the run.

use std::path::Path;
use std::sync::Arc;

use seabee_protocol::{PipelineEvent, PipelineStep, ProgressSample, TransferAction};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::TransferError;
use crate::progress::{ProgressParser, RcloneProgressParser};
use crate::runner::{CommandRunner, CommandSpec};
use crate::sidecar::SidecarWriter;

/// Output lines buffered between a running command and the parser.
const LINE_BUFFER: usize = 64;

/// External command settings for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Sync tool executable (`rclone`).
    pub sync_program: String,
    /// Configured remote name of the object store.
    pub remote: String,
    pub bucket: String,
    /// Key prefix inside the bucket; may be empty.
    pub bucket_prefix: String,
    pub unmount_program: String,
    /// Directory on the source card that gets copied.
    pub media_dir: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_program: "rclone".into(),
            remote: "minio".into(),
            bucket: "seabirds".into(),
            bucket_prefix: "fielduploads".into(),
            unmount_program: "umount".into(),
            media_dir: "DCIM".into(),
        }
    }
}

impl SyncSettings {
    /// Destination path on the remote, e.g. `minio:seabirds/fielduploads`.
    pub fn bucket_path(&self) -> String {
        let prefix = self.bucket_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}:{}", self.remote, self.bucket)
        } else {
            format!("{}:{}/{prefix}", self.remote, self.bucket)
        }
    }
}

/// Runs the copy/unmount/upload steps for a requested action.
pub struct CommandPipeline {
    runner: Arc<dyn CommandRunner>,
    parser: Box<dyn ProgressParser>,
    settings: SyncSettings,
    sidecars: SidecarWriter,
}

impl CommandPipeline {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: SyncSettings, sidecars: SidecarWriter) -> Self {
        Self {
            runner,
            parser: Box::new(RcloneProgressParser),
            settings,
            sidecars,
        }
    }

    /// Replaces the progress parser.
    pub fn with_parser(mut self, parser: Box<dyn ProgressParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Builds the ordered step list for `action`.
    ///
    /// Fails with [`TransferError::InvalidRequest`] when a device the action
    /// needs is absent.
    pub fn build_steps(
        &self,
        action: TransferAction,
        source: Option<&Path>,
        target: Option<&Path>,
    ) -> Result<Vec<PipelineStep>, TransferError> {
        let target = target.ok_or_else(|| {
            TransferError::InvalidRequest(format!("{action} requires a target drive"))
        })?;
        let source = match (action.requires_source(), source) {
            (true, None) => {
                return Err(TransferError::InvalidRequest(format!(
                    "{action} requires a source card"
                )));
            }
            (_, source) => source,
        };

        let copy = || {
            source.map(|source| PipelineStep::Copy {
                from: source.join(&self.settings.media_dir),
                to: target.to_path_buf(),
            })
        };
        let upload = PipelineStep::Upload {
            from: target.to_path_buf(),
            bucket_path: self.settings.bucket_path(),
        };

        let steps = match action {
            TransferAction::CopyOnly => copy().into_iter().collect(),
            TransferAction::UploadOnly => vec![upload],
            TransferAction::CopyAndUpload => {
                let mut steps: Vec<PipelineStep> = copy().into_iter().collect();
                if let Some(source) = source {
                    steps.push(PipelineStep::Unmount {
                        path: source.to_path_buf(),
                    });
                }
                steps.push(upload);
                steps
            }
        };
        Ok(steps)
    }

    /// Command line for one step.
    pub fn command_for(&self, step: &PipelineStep) -> CommandSpec {
        match step {
            PipelineStep::Copy { from, to } => CommandSpec::new(
                &self.settings.sync_program,
                [
                    "copy".to_string(),
                    from.display().to_string(),
                    to.display().to_string(),
                    "--progress".to_string(),
                ],
            ),
            PipelineStep::Unmount { path } => {
                CommandSpec::new(&self.settings.unmount_program, [path.display().to_string()])
            }
            PipelineStep::Upload { from, bucket_path } => CommandSpec::new(
                &self.settings.sync_program,
                [
                    "copy".to_string(),
                    from.display().to_string(),
                    bucket_path.clone(),
                    "--progress".to_string(),
                ],
            ),
        }
    }

    /// Builds the steps for `action` and executes them.
    ///
    /// An invalid request fails before any event is sent.
    pub async fn run(
        &self,
        action: TransferAction,
        source: Option<&Path>,
        target: Option<&Path>,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<(), TransferError> {
        let steps = self.build_steps(action, source, target)?;
        self.execute(&steps, events).await
    }

    /// Executes `steps` in order, ending with exactly one `AllFinished` or
    /// `AllFailed` event.
    pub async fn execute(
        &self,
        steps: &[PipelineStep],
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<(), TransferError> {
        for (index, step) in steps.iter().enumerate() {
            let _ = events
                .send(PipelineEvent::StepStarted {
                    index,
                    step: step.clone(),
                })
                .await;

            let command = self.command_for(step);
            info!(step = step.kind(), index, command = %command, "running pipeline step");

            let result = self.run_command(&command, events).await;

            if let PipelineStep::Unmount { path } = step {
                // The card is treated as detached whatever umount reports.
                let exit_code = match result {
                    Ok(code) => code,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "unmount could not be run");
                        None
                    }
                };
                if exit_code != Some(0) {
                    warn!(path = %path.display(), code = ?exit_code, "unmount did not exit cleanly");
                }
                self.finish_step(index, step, exit_code, events).await;
                continue;
            }

            let exit_code = match result {
                Ok(code) => code,
                Err(e) => return self.fail(step, e.to_string(), events).await,
            };
            self.finish_step(index, step, exit_code, events).await;

            if exit_code != Some(0) {
                return self.fail(step, describe_exit(exit_code), events).await;
            }

            if let PipelineStep::Copy { from, to } = step {
                let from = from.clone();
                let to = to.clone();
                let sidecars = self.sidecars.clone();
                let written =
                    tokio::task::spawn_blocking(move || sidecars.write_for_copy(&from, &to)).await;
                if let Err(e) = written {
                    warn!(error = %e, "sidecar task failed");
                }
            }
        }

        info!(steps = steps.len(), "pipeline finished");
        let _ = events.send(PipelineEvent::AllFinished).await;
        Ok(())
    }

    /// Runs one command, forwarding scraped progress as events.
    async fn run_command(
        &self,
        command: &CommandSpec,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<Option<i32>, TransferError> {
        let (lines_tx, mut lines_rx) = mpsc::channel::<String>(LINE_BUFFER);
        let run = self.runner.run(command, lines_tx);

        let consume = async {
            let mut latest: Option<ProgressSample> = None;
            while let Some(line) = lines_rx.recv().await {
                debug!(line = %line, "command output");
                if let Some(sample) = self.parser.parse(&line) {
                    if latest.as_ref() == Some(&sample) {
                        continue;
                    }
                    latest = Some(sample.clone());
                    let _ = events.send(PipelineEvent::Progress { sample }).await;
                }
            }
        };

        let (result, ()) = tokio::join!(run, consume);
        result
    }

    async fn finish_step(
        &self,
        index: usize,
        step: &PipelineStep,
        exit_code: Option<i32>,
        events: &mpsc::Sender<PipelineEvent>,
    ) {
        let _ = events
            .send(PipelineEvent::StepFinished {
                index,
                step: step.clone(),
                exit_code,
            })
            .await;
    }

    async fn fail(
        &self,
        step: &PipelineStep,
        reason: String,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<(), TransferError> {
        error!(step = step.kind(), reason = %reason, "pipeline step failed");
        let _ = events
            .send(PipelineEvent::AllFailed {
                step: step.clone(),
                reason: reason.clone(),
            })
            .await;
        Err(TransferError::StepFailed {
            step: step.label(),
            reason,
        })
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "terminated by signal".to_string(),
    }
}
