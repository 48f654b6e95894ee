//! Line-oriented front end.
//!
//! Reads action names from stdin and renders engine snapshots when they
//! change. Any richer front end only needs the same two engine calls.

use std::sync::Arc;
use std::time::Duration;

use seabee_engine::{EngineError, Orchestrator};
use seabee_protocol::{EngineSnapshot, TransferAction};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// How often the render loop looks at the engine.
pub const RENDER_INTERVAL: Duration = Duration::from_millis(500);

/// What a typed line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Action(TransferAction),
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line; blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let command = match line.to_ascii_lowercase().as_str() {
            "status" | "s" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => other
                .parse::<TransferAction>()
                .map(Command::Action)
                .map_err(|e| e.to_string()),
        };
        Some(command)
    }
}

/// Reads commands from `input` until it closes or `quit` is typed.
pub async fn run_commands<R>(engine: Arc<Orchestrator>, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    print_help();

    while let Some(line) = lines.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        match command {
            Ok(Command::Action(action)) => match engine.request_action(action).await {
                Ok(()) => println!("started: {action}"),
                Err(EngineError::Busy) => println!("a transfer is already running"),
                Err(e) => println!("cannot start {action}: {e}"),
            },
            Ok(Command::Status) => println!("{}", render(&engine.snapshot().await)),
            Ok(Command::Help) => print_help(),
            Ok(Command::Quit) => break,
            Err(e) => println!("{e} (type 'help')"),
        }
    }
    Ok(())
}

/// Prints a fresh render whenever the snapshot changes.
pub async fn render_changes(engine: Arc<Orchestrator>) {
    let mut last = String::new();
    let mut interval = tokio::time::interval(RENDER_INTERVAL);
    loop {
        interval.tick().await;
        let text = render(&engine.snapshot().await);
        if text != last {
            println!("{text}");
            last = text;
        }
    }
}

/// Render-ready text for one snapshot.
pub fn render(snapshot: &EngineSnapshot) -> String {
    let devices = &snapshot.devices;
    let mut out = String::new();

    if snapshot.source_safe_to_remove {
        out.push_str("SD card: safe to remove\n");
    } else if devices.source_present {
        out.push_str(&format!(
            "SD card: {} missions, {} manual\n",
            devices.source_mission_count, devices.source_manual_count
        ));
    } else {
        out.push_str("SD card: not found\n");
    }

    if devices.target_present {
        out.push_str(&format!(
            "Drive: {} missions, {} manual\n",
            devices.target_mission_count, devices.target_manual_count
        ));
    } else {
        out.push_str("Drive: not found\n");
    }

    out.push_str(if snapshot.internet_connected {
        "Internet: connected"
    } else {
        "Internet: offline"
    });

    if let Some(message) = snapshot.status_message() {
        out.push('\n');
        out.push_str(&message);
    }

    let actions = snapshot.available_actions();
    if !actions.is_empty() {
        let names: Vec<&str> = actions.iter().map(|a| a.name()).collect();
        out.push_str(&format!("\nAvailable: {}", names.join(", ")));
    }
    out
}

fn print_help() {
    println!("commands: copy | upload | both | status | help | quit");
}
