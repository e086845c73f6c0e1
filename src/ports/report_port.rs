//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::ValtraderError;
use crate::domain::metrics::Metrics;
use std::path::Path;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        output_dir: &Path,
    ) -> Result<(), ValtraderError>;
}
