//! Internet reachability probe.
//!
//! A single ICMP echo against a well-known public address, bounded in
//! time. Any failure to run the check counts as "unreachable".

mod probe;

pub use probe::{PingProbe, Probe, ProbeError, ProbeFuture};

/// Address pinged by default.
pub const DEFAULT_PING_HOST: &str = "8.8.8.8";
