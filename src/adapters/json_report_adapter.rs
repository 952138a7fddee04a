//! JSON-lines report adapter.
//!
//! Records optimization summaries one JSON object per line, append-only,
//! so a sweep's output can be re-ranked or diffed with standard tooling.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::domain::error::GridtraderError;
use crate::domain::optimizer::OptimizationSummary;
use crate::ports::report_port::ReportPort;

pub struct JsonlReportAdapter {
    path: PathBuf,
}

impl JsonlReportAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReportPort for JsonlReportAdapter {
    fn record(&mut self, summaries: &[OptimizationSummary]) -> Result<(), GridtraderError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        for summary in summaries {
            let line = serde_json::to_string(summary).map_err(|e| GridtraderError::Data {
                reason: format!("summary serialization failed: {}", e),
            })?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
