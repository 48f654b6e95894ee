//! The engine façade.

use std::future::Future;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use seabee_connectivity::{PingProbe, Probe};
use seabee_discovery::DeviceScanner;
use seabee_protocol::{EngineSnapshot, PipelineEvent, PipelineStep, TransferAction, TransferStatus};
use seabee_status::Mailbox;
use seabee_transfer::{CommandPipeline, CommandRunner, SidecarWriter, SystemRunner, TransferError};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pumps::run_every;
use crate::state::EngineState;

/// Pipeline events buffered between a run and its status folder.
const EVENT_BUFFER: usize = 64;

/// Owns the engine state and drives scans, probes and pipeline runs.
///
/// Every state mutation goes through the state lock, including the
/// `transfer_active` read-then-branch in [`request_action`] and
/// [`scan_devices`], so a user action can never interleave with a scan.
///
/// [`request_action`]: Orchestrator::request_action
/// [`scan_devices`]: Orchestrator::scan_devices
pub struct Orchestrator {
    config: EngineConfig,
    state: Arc<Mutex<EngineState>>,
    scanner: DeviceScanner,
    pipeline: Arc<CommandPipeline>,
    probe: Arc<dyn Probe>,
    status: Arc<Mailbox<TransferStatus>>,
    cancel: CancellationToken,
    timers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    run: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Engine backed by real processes: `rclone`, `umount`, `ping`.
    pub fn new(config: EngineConfig) -> Self {
        let probe = PingProbe::new(&config.ping_host, config.probe_timeout)
            .with_program(config.ping_program.clone());
        let scanner = DeviceScanner::new(config.scan_layout());
        Self::with_components(config, Arc::new(SystemRunner), Arc::new(probe), scanner)
    }

    pub fn with_components(
        config: EngineConfig,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn Probe>,
        scanner: DeviceScanner,
    ) -> Self {
        let template = SidecarWriter::load_template(config.sidecar_template.as_deref());
        let sidecars = SidecarWriter::new(config.sidecar_file_name.clone(), template, scanner.clone());
        let pipeline = CommandPipeline::new(runner, config.sync_settings(), sidecars);

        Self {
            config,
            state: Arc::new(Mutex::new(EngineState::default())),
            scanner,
            pipeline: Arc::new(pipeline),
            probe,
            status: Arc::new(Mailbox::new()),
            cancel: CancellationToken::new(),
            timers: std::sync::Mutex::new(Vec::new()),
            run: std::sync::Mutex::new(None),
        }
    }

    /// Render-ready copy of the current state.
    pub async fn snapshot(&self) -> EngineSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Starts `action` against the devices of the latest scan.
    ///
    /// Returns once the run is spawned. Fails with [`EngineError::Busy`]
    /// while another run is active and with [`EngineError::InvalidRequest`]
    /// when a device the action needs is absent; neither touches the state.
    pub async fn request_action(&self, action: TransferAction) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.transfer_active {
            warn!(action = %action, "transfer already running, request refused");
            return Err(EngineError::Busy);
        }

        // A card that was unmounted is gone even if the last scan still lists it.
        let source = if state.source_safe_to_remove {
            None
        } else {
            state.devices.source_path.clone()
        };
        let target = state.devices.target_path.clone();

        let steps = self
            .pipeline
            .build_steps(action, source.as_deref(), target.as_deref())
            .inspect_err(|e| warn!(action = %action, error = %e, "transfer request rejected"))?;

        info!(
            action = %action,
            steps = steps.len(),
            source = ?source,
            target = ?target,
            "starting transfer"
        );

        let status = TransferStatus::new(action, steps.len());
        state.transfer_active = true;
        state.transfer = Some(status.clone());

        let handle = tokio::spawn(drive_run(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.status),
            steps,
            status,
        ));
        *self.run_slot() = Some(handle);
        Ok(())
    }

    /// Rescans the mount root unless a transfer is active.
    ///
    /// A failed scan keeps the previous snapshot.
    pub async fn scan_devices(&self) {
        let mut state = self.state.lock().await;
        if state.transfer_active {
            debug!("transfer active, skipping device scan");
            return;
        }

        let scanner = self.scanner.clone();
        let root = self.config.mount_root.clone();
        match tokio::task::spawn_blocking(move || scanner.scan(&root)).await {
            Ok(Ok(devices)) => {
                state.apply_scan(devices);
            }
            Ok(Err(e)) => warn!(error = %e, "device scan failed, keeping previous snapshot"),
            Err(e) => warn!(error = %e, "device scan task failed"),
        }
    }

    /// Runs one connectivity probe and records the answer.
    pub async fn probe_connectivity(&self) {
        let connected = self.probe.probe().await;
        let mut state = self.state.lock().await;
        if state.set_connected(connected) {
            info!(connected, "internet connectivity changed");
        }
    }

    /// Drains the status mailbox into the engine state.
    pub async fn poll_status(&self) {
        let mut state = self.state.lock().await;
        let run_done = self.run_slot().as_ref().is_none_or(JoinHandle::is_finished);

        if let Some(status) = self.status.drain_latest() {
            state.apply_status(status);
        }

        if state.transfer_active && run_done {
            error!("transfer task ended without a final status");
            state.abandon_transfer("transfer task ended unexpectedly");
        }
    }

    /// Spawns the scan, probe and status poll timers.
    pub fn start(self: &Arc<Self>) {
        info!(
            mount_root = %self.config.mount_root.display(),
            bucket = %self.pipeline.settings().bucket_path(),
            "engine starting"
        );
        self.spawn_timer(self.config.scan_interval, |engine| async move {
            engine.scan_devices().await;
        });
        self.spawn_timer(self.config.probe_interval, |engine| async move {
            engine.probe_connectivity().await;
        });
        self.spawn_timer(self.config.status_poll_interval, |engine| async move {
            engine.poll_status().await;
        });
    }

    /// Stops the timers and waits for an in-flight run to finish.
    ///
    /// Running child processes are never killed; the final status is
    /// applied before this returns.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let timers = std::mem::take(&mut *self.timer_slots());
        for timer in timers {
            if let Err(e) = timer.await {
                warn!(error = %e, "timer task failed");
            }
        }

        let run = self.run_slot().take();
        if let Some(run) = run {
            if !run.is_finished() {
                info!("waiting for the running transfer to finish");
            }
            if let Err(e) = run.await {
                error!(error = %e, "transfer task failed");
            }
        }

        self.poll_status().await;
        info!("engine stopped");
    }

    fn spawn_timer<F, Fut>(self: &Arc<Self>, period: Duration, tick: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let engine = Arc::clone(self);
        let handle = tokio::spawn(run_every(period, self.cancel.clone(), move || {
            tick(Arc::clone(&engine))
        }));
        self.timer_slots().push(handle);
    }

    fn timer_slots(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Executes one run, publishing the cumulative status after every event.
async fn drive_run(
    pipeline: Arc<CommandPipeline>,
    mailbox: Arc<Mailbox<TransferStatus>>,
    steps: Vec<PipelineStep>,
    mut status: TransferStatus,
) {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

    let fold = async {
        while let Some(event) = rx.recv().await {
            status.apply(&event);
            mailbox.publish(status.clone());
        }
    };
    let (result, ()) = tokio::join!(execute(&pipeline, &steps, tx), fold);
    if let Err(e) = result {
        debug!(error = %e, "transfer run ended with an error");
    }
}

/// Takes the sender by value so the event stream closes when the run ends.
async fn execute(
    pipeline: &CommandPipeline,
    steps: &[PipelineStep],
    events: mpsc::Sender<PipelineEvent>,
) -> Result<(), TransferError> {
    pipeline.execute(steps, &events).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    use seabee_connectivity::ProbeFuture;
    use seabee_protocol::RunOutcome;
    use seabee_transfer::{CommandSpec, RunFuture};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Reports the start of its step, then panics.
    struct PanickingRunner;

    impl CommandRunner for PanickingRunner {
        fn run<'a>(&'a self, _: &'a CommandSpec, _: mpsc::Sender<String>) -> RunFuture<'a> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                panic!("runner blew up");
            })
        }
    }

    /// Answers with scripted exit codes; optionally holds every command
    /// until the gate is opened.
    #[derive(Default)]
    struct FakeRunner {
        gate: Option<Arc<Notify>>,
        codes: std::sync::Mutex<VecDeque<Option<i32>>>,
        calls: std::sync::Mutex<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        fn with_codes(codes: Vec<Option<i32>>) -> Self {
            Self {
                codes: std::sync::Mutex::new(codes.into()),
                ..Default::default()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run<'a>(&'a self, command: &'a CommandSpec, lines: mpsc::Sender<String>) -> RunFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(command.clone());
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                let _ = lines
                    .send("Transferred:   1 GiB / 2 GiB, 50%, 10 MiB/s, ETA 1m".to_string())
                    .await;
                Ok(self.codes.lock().unwrap().pop_front().unwrap_or(Some(0)))
            })
        }
    }

    #[derive(Default)]
    struct FakeProbe(AtomicBool);

    impl Probe for FakeProbe {
        fn probe(&self) -> ProbeFuture<'_> {
            let up = self.0.load(Ordering::SeqCst);
            Box::pin(async move { up })
        }
    }

    fn always_mounted(_: &Path) -> io::Result<bool> {
        Ok(true)
    }

    /// `SD` card with one mission and one manual capture, empty `USB` drive.
    fn media() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let dcim = tmp.path().join("SD").join("DCIM");
        fs::create_dir_all(dcim.join("DJI_001_20240101_0001")).unwrap();
        fs::create_dir_all(dcim.join("DJI_002_20240101")).unwrap();
        fs::create_dir_all(tmp.path().join("USB")).unwrap();
        tmp
    }

    fn engine(root: &Path, runner: Arc<FakeRunner>) -> Orchestrator {
        let config = EngineConfig {
            mount_root: root.to_path_buf(),
            ..Default::default()
        };
        let scanner = DeviceScanner::new(config.scan_layout()).with_mount_check(always_mounted);
        Orchestrator::with_components(config, runner, Arc::new(FakeProbe::default()), scanner)
    }

    async fn wait_idle(engine: &Orchestrator) -> EngineSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                engine.poll_status().await;
                let snap = engine.snapshot().await;
                if !snap.transfer_active {
                    return snap;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transfer should finish")
    }

    #[tokio::test]
    async fn scan_populates_snapshot() {
        let tmp = media();
        let engine = engine(tmp.path(), Arc::new(FakeRunner::default()));
        engine.scan_devices().await;

        let snap = engine.snapshot().await;
        assert_eq!(snap.devices.source_path, Some(tmp.path().join("SD")));
        assert_eq!(snap.devices.source_mission_count, 1);
        assert_eq!(snap.devices.source_manual_count, 1);
        assert_eq!(snap.devices.target_path, Some(tmp.path().join("USB")));
        assert_eq!(snap.available_actions(), TransferAction::ALL.to_vec());
    }

    #[tokio::test]
    async fn failed_scan_keeps_previous_snapshot() {
        let tmp = media();
        let engine = engine(tmp.path(), Arc::new(FakeRunner::default()));
        engine.scan_devices().await;
        let before = engine.snapshot().await;

        fs::remove_dir_all(tmp.path()).unwrap();
        engine.scan_devices().await;
        assert_eq!(engine.snapshot().await, before);
    }

    #[tokio::test]
    async fn invalid_request_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let engine = engine(tmp.path(), Arc::clone(&runner));
        engine.scan_devices().await;
        let before = engine.snapshot().await;

        let err = engine.request_action(TransferAction::CopyOnly).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert_eq!(engine.snapshot().await, before);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn busy_request_changes_nothing() {
        let tmp = media();
        let gate = Arc::new(Notify::new());
        let engine = engine(tmp.path(), Arc::new(FakeRunner::gated(Arc::clone(&gate))));
        engine.scan_devices().await;

        engine.request_action(TransferAction::CopyOnly).await.unwrap();
        let before = engine.snapshot().await;
        assert!(before.transfer_active);
        assert!(before.available_actions().is_empty());

        let err = engine.request_action(TransferAction::UploadOnly).await.unwrap_err();
        assert!(matches!(err, EngineError::Busy));
        assert_eq!(engine.snapshot().await, before);

        gate.notify_one();
        let after = wait_idle(&engine).await;
        assert_eq!(
            after.transfer.and_then(|t| t.outcome),
            Some(RunOutcome::Finished)
        );
    }

    #[tokio::test]
    async fn scan_is_skipped_during_transfer() {
        let tmp = media();
        let gate = Arc::new(Notify::new());
        let engine = engine(tmp.path(), Arc::new(FakeRunner::gated(Arc::clone(&gate))));
        engine.scan_devices().await;
        let devices = engine.snapshot().await.devices;

        engine.request_action(TransferAction::UploadOnly).await.unwrap();
        fs::create_dir_all(tmp.path().join("USB").join("DJI_009_20240102_0001")).unwrap();
        engine.scan_devices().await;
        assert_eq!(engine.snapshot().await.devices, devices);

        gate.notify_one();
        wait_idle(&engine).await;
        engine.scan_devices().await;
        assert_eq!(engine.snapshot().await.devices.target_mission_count, 1);
    }

    #[tokio::test]
    async fn copy_and_upload_detaches_source() {
        let tmp = media();
        let runner = Arc::new(FakeRunner::default());
        let engine = engine(tmp.path(), Arc::clone(&runner));
        engine.scan_devices().await;

        engine.request_action(TransferAction::CopyAndUpload).await.unwrap();
        let snap = wait_idle(&engine).await;

        assert_eq!(runner.calls().len(), 3);
        assert!(snap.source_safe_to_remove);
        let status = snap.transfer.clone().unwrap();
        assert_eq!(status.outcome, Some(RunOutcome::Finished));
        assert!(status.message().ends_with("All steps finished"));
        assert_eq!(snap.progress.as_ref().unwrap().percent, "50%");
        assert_eq!(snap.available_actions(), vec![TransferAction::UploadOnly]);

        // The same card path is still listed, so it stays detached.
        engine.scan_devices().await;
        assert!(engine.snapshot().await.source_safe_to_remove);
    }

    #[tokio::test]
    async fn failing_step_ends_run() {
        let tmp = media();
        let runner = Arc::new(FakeRunner::with_codes(vec![Some(1)]));
        let engine = engine(tmp.path(), Arc::clone(&runner));
        engine.scan_devices().await;

        engine.request_action(TransferAction::CopyAndUpload).await.unwrap();
        let snap = wait_idle(&engine).await;

        assert_eq!(runner.calls().len(), 1);
        assert!(!snap.source_safe_to_remove);
        let status = snap.transfer.unwrap();
        assert!(matches!(
            status.outcome,
            Some(RunOutcome::Failed { step: PipelineStep::Copy { .. }, .. })
        ));
        assert!(status.message().starts_with("Transfer failed at step"));

        // The engine stays usable.
        engine.request_action(TransferAction::UploadOnly).await.unwrap();
        wait_idle(&engine).await;
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn crashed_run_does_not_leave_engine_busy() {
        let tmp = media();
        let config = EngineConfig {
            mount_root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let scanner = DeviceScanner::new(config.scan_layout()).with_mount_check(always_mounted);
        let engine = Orchestrator::with_components(
            config,
            Arc::new(PanickingRunner),
            Arc::new(FakeProbe::default()),
            scanner,
        );
        engine.scan_devices().await;

        engine.request_action(TransferAction::UploadOnly).await.unwrap();
        let snap = wait_idle(&engine).await;

        let status = snap.transfer.unwrap();
        match status.outcome {
            Some(RunOutcome::Failed { step, reason }) => {
                assert_eq!(step.kind(), "upload");
                assert_eq!(reason, "transfer task ended unexpectedly");
            }
            other => panic!("expected a failed run, got {other:?}"),
        }
        assert!(engine.request_action(TransferAction::UploadOnly).await.is_ok());
    }

    #[tokio::test]
    async fn probe_updates_connectivity() {
        let tmp = TempDir::new().unwrap();
        let probe = Arc::new(FakeProbe::default());
        let config = EngineConfig {
            mount_root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let engine = Orchestrator::with_components(
            config,
            Arc::new(FakeRunner::default()),
            Arc::clone(&probe) as Arc<dyn Probe>,
            DeviceScanner::default(),
        );

        engine.probe_connectivity().await;
        assert!(!engine.snapshot().await.internet_connected);

        probe.0.store(true, Ordering::SeqCst);
        engine.probe_connectivity().await;
        assert!(engine.snapshot().await.internet_connected);
    }

    #[tokio::test]
    async fn shutdown_waits_for_running_transfer() {
        let tmp = media();
        let runner = Arc::new(FakeRunner::default());
        let config = EngineConfig {
            mount_root: tmp.path().to_path_buf(),
            scan_interval: Duration::from_millis(10),
            probe_interval: Duration::from_millis(10),
            status_poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let scanner = DeviceScanner::new(config.scan_layout()).with_mount_check(always_mounted);
        let engine = Arc::new(Orchestrator::with_components(
            config,
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            Arc::new(FakeProbe(AtomicBool::new(true))),
            scanner,
        ));

        engine.start();
        let expected: Option<PathBuf> = Some(tmp.path().join("USB"));
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.snapshot().await.devices.target_path != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timer scan should find the target");

        engine.request_action(TransferAction::UploadOnly).await.unwrap();
        engine.shutdown().await;

        let snap = engine.snapshot().await;
        assert!(!snap.transfer_active);
        assert!(snap.internet_connected);
        assert_eq!(
            snap.transfer.and_then(|t| t.outcome),
            Some(RunOutcome::Finished)
        );
        assert_eq!(runner.calls().len(), 1);
    }
}
