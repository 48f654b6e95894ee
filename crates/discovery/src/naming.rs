//! Capture folder naming convention.
//!
//! The flight controller names folders `DJI_<id>_<date>` for manual flights
//! and `DJI_<id>_<date>_<mission>` for automated missions. Only the number
//! of `_`-separated segments matters; segment contents are never checked.

/// Kind of capture folder, decided purely by segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    Manual,
    Mission,
    Unrecognized,
}

/// Classifies a folder name: 3 segments is manual, 4 is a mission.
pub fn classify(folder_name: &str) -> CaptureKind {
    match folder_name.split('_').count() {
        3 => CaptureKind::Manual,
        4 => CaptureKind::Mission,
        _ => CaptureKind::Unrecognized,
    }
}

/// Mission and manual folder tallies for one location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureCounts {
    pub missions: usize,
    pub manual: usize,
}

impl CaptureCounts {
    /// Counts one folder. Unrecognized folders count toward neither.
    pub fn record(&mut self, kind: CaptureKind) {
        match kind {
            CaptureKind::Manual => self.manual += 1,
            CaptureKind::Mission => self.missions += 1,
            CaptureKind::Unrecognized => {}
        }
    }
}
