//! Transfer orchestration engine.
//!
//! Composes device discovery, the connectivity probe and the command
//! pipeline behind one façade. A presentation layer only needs two calls:
//! [`Orchestrator::snapshot`] to render state and
//! [`Orchestrator::request_action`] to start a named action.
//!
//! # Tasks
//!
//! 1. **Scan**: re-classifies mounted media on a timer (skipped while a
//!    transfer runs)
//! 2. **Probe**: checks internet reachability on its own timer
//! 3. **Status poll**: drains the status mailbox into the engine state
//! 4. **Run**: one task per active pipeline run

pub mod config;
pub mod error;
pub mod orchestrator;
mod pumps;
pub mod state;

pub use config::EngineConfig;
pub use error::EngineError;
pub use orchestrator::Orchestrator;
pub use state::EngineState;
