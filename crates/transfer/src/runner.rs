//! External command execution.
//!
//! `CommandRunner` is the seam between the pipeline and the operating
//! system: the pipeline only sees output lines and an exit code, so tests
//! can script both without spawning anything.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::TransferError;

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Boxed future returned by [`CommandRunner::run`].
///
/// Resolves to the exit code, or `None` when the process was killed by a
/// signal.
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<i32>, TransferError>> + Send + 'a>>;

/// Runs a command to completion.
pub trait CommandRunner: Send + Sync {
    /// Runs `command`, sending every line of its merged stdout/stderr to
    /// `lines`. The sender is dropped once the process has exited and its
    /// output is drained.
    fn run<'a>(&'a self, command: &'a CommandSpec, lines: mpsc::Sender<String>) -> RunFuture<'a>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run<'a>(&'a self, command: &'a CommandSpec, lines: mpsc::Sender<String>) -> RunFuture<'a> {
        Box::pin(async move {
            let mut child = tokio::process::Command::new(&command.program)
                .args(&command.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|source| TransferError::Spawn {
                    program: command.program.clone(),
                    source,
                })?;

            let mut readers = Vec::with_capacity(2);
            if let Some(stdout) = child.stdout.take() {
                readers.push(tokio::spawn(forward_lines(stdout, lines.clone())));
            }
            if let Some(stderr) = child.stderr.take() {
                readers.push(tokio::spawn(forward_lines(stderr, lines.clone())));
            }
            drop(lines);

            let status = match child.wait().await {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(command = %command, error = %e, "failed to wait for command");
                    abandon(&mut child, &readers);
                    return Err(e.into());
                }
            };
            for reader in readers {
                if let Err(e) = reader.await {
                    tracing::warn!(error = %e, "output reader task failed");
                }
            }

            tracing::debug!(command = %command, code = ?status.code(), "command exited");
            Ok(status.code())
        })
    }
}

/// Kills a child that can no longer be waited on and stops its readers.
fn abandon(child: &mut Child, readers: &[JoinHandle<()>]) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "failed to kill command");
    }
    for reader in readers {
        reader.abort();
    }
}

/// Forwards output to `lines`, splitting on `\n` and on the `\r` that
/// progress redraws use.
async fn forward_lines<R>(reader: R, lines: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                for part in text.split(['\r', '\n']) {
                    if part.trim().is_empty() {
                        continue;
                    }
                    if lines.send(part.to_string()).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read command output");
                break;
            }
        }
    }
}
