//! Export window calculation for incremental exports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time range `[from, to)` captured by one export. Both ends are absent for full exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ExportWindow {
    /// Window of a full (non-incremental) export
    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_incremental(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }
}

/// Window from the start of `now`'s UTC day up to `now`.
///
/// `from` never precedes `earliest_allowed` (the oldest point the source can
/// still export).
pub fn compute_window(now: DateTime<Utc>, earliest_allowed: Option<DateTime<Utc>>) -> ExportWindow {
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now);

    let from = match earliest_allowed {
        Some(earliest) if day_start < earliest => earliest,
        _ => day_start,
    };
    // A skewed earliest point past `now` must not invert the window
    let from = from.min(now);

    ExportWindow {
        from: Some(from),
        to: Some(now),
    }
}
