//! Result recording port trait.

use crate::domain::error::GridtraderError;
use crate::domain::optimizer::OptimizationSummary;

/// Persistence hook for optimization results. The core never talks to
/// storage directly; adapters decide where summaries land.
pub trait ReportPort {
    fn record(&mut self, summaries: &[OptimizationSummary]) -> Result<(), GridtraderError>;
}
