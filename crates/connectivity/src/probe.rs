use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use crate::DEFAULT_PING_HOST;

/// Default bound on a single probe.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Boxed future returned by [`Probe::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// A reachability check.
pub trait Probe: Send + Sync {
    /// Resolves to `true` when the network is reachable. Never fails.
    fn probe(&self) -> ProbeFuture<'_>;
}

/// Reasons a ping could not produce an answer.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

/// Checks reachability by running `ping` once.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PING_HOST, DEFAULT_TIMEOUT)
    }
}

impl PingProbe {
    /// One echo request to `host`, waiting at most `timeout`.
    pub fn new(host: &str, timeout: Duration) -> Self {
        let wait_secs = timeout.as_secs().max(1);
        Self::with_command(
            "ping",
            vec![
                "-c".into(),
                "1".into(),
                "-W".into(),
                wait_secs.to_string(),
                host.to_string(),
            ],
            timeout,
        )
    }

    /// Uses an arbitrary command whose exit status answers the question.
    pub fn with_command(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Replaces the executable, keeping the arguments.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Runs the command once. `Ok(true)` means it exited with status 0.
    pub async fn check(&self) -> Result<bool, ProbeError> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => Ok(output.status.success()),
            Ok(Err(source)) => Err(ProbeError::Spawn {
                program: self.program.clone(),
                source,
            }),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}

impl Probe for PingProbe {
    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            match self.check().await {
                Ok(reachable) => reachable,
                Err(e) => {
                    tracing::warn!(error = %e, "connectivity probe failed, treating as offline");
                    false
                }
            }
        })
    }
}
