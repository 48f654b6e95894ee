//! Progress scraping from sync-tool output.

use std::sync::LazyLock;

use regex::Regex;
use seabee_protocol::ProgressSample;

/// Extracts a progress sample from one line of command output.
///
/// Returns `None` for lines without progress information; callers keep
/// whatever sample they already hold.
pub trait ProgressParser: Send + Sync {
    fn parse(&self, line: &str) -> Option<ProgressSample>;
}

/// Byte-size token as rclone prints it: `0 B`, `1.5 KiB`, `3.217 GiB`.
const SIZE: &str = r"[\d.]+\s*(?:[kKMGTPE]i)?B";

/// Matches rclone's stats line, e.g.
/// `Transferred:   1.234 GiB / 2.000 GiB, 62%, 10.123 MiB/s, ETA 1m16s`.
///
/// File-count lines (`Transferred: 5 / 10, 50%`) carry no units and do not match.
static RCLONE_STATS: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"Transferred:\s+({SIZE})\s*/\s*({SIZE}),\s*(\d+%).*?({SIZE}/s).*?ETA\s+(\S.*?)\s*$"
    );
    Regex::new(&pattern).expect("rclone stats pattern is valid")
});

/// Parser for `rclone copy --progress` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RcloneProgressParser;

impl ProgressParser for RcloneProgressParser {
    fn parse(&self, line: &str) -> Option<ProgressSample> {
        let caps = RCLONE_STATS.captures(line)?;
        Some(ProgressSample {
            transferred: caps[1].to_string(),
            total: caps[2].to_string(),
            percent: caps[3].to_string(),
            speed: caps[4].to_string(),
            eta: caps[5].to_string(),
        })
    }
}
