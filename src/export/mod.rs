//! Export Module - export windows and the point-in-time export trigger

pub mod trigger;
pub mod window;

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use trigger::{DynamoDbExportService, ExportRequest, ExportService, ExportTrigger, SourceTable};
pub use window::{compute_window, ExportWindow};

/// Pipeline variant, fixed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportMode {
    /// Whole-table snapshot into a fresh location every cycle
    Full,
    /// Changes since the start of the day, appended under a stable location
    Incremental,
}

impl ExportMode {
    /// Window to request for this mode; full exports carry none
    pub fn window_for(
        &self,
        now: DateTime<Utc>,
        earliest_allowed: Option<DateTime<Utc>>,
    ) -> ExportWindow {
        match self {
            ExportMode::Full => ExportWindow::full(),
            ExportMode::Incremental => compute_window(now, earliest_allowed),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Full => "FULL_EXPORT",
            ExportMode::Incremental => "INCREMENTAL_EXPORT",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FULL_EXPORT" | "FULL" => Ok(ExportMode::Full),
            "INCREMENTAL_EXPORT" | "INCREMENTAL" => Ok(ExportMode::Incremental),
            other => Err(PipelineError::Config(format!(
                "Unknown export type: {} (expected FULL_EXPORT or INCREMENTAL_EXPORT)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("FULL_EXPORT".parse::<ExportMode>().unwrap(), ExportMode::Full);
        assert_eq!(
            "incremental_export".parse::<ExportMode>().unwrap(),
            ExportMode::Incremental
        );
        assert!("DELTA".parse::<ExportMode>().is_err());
    }

    #[test]
    fn test_full_mode_has_no_window() {
        let window = ExportMode::Full.window_for(Utc::now(), None);
        assert_eq!(window, ExportWindow::full());
    }
}
