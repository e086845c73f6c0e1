//! Indicator computation port trait.

use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::ohlcv::OhlcvBar;

/// Turns a date-ordered bar series into one snapshot per bar.
pub trait IndicatorPort {
    fn snapshots(&self, bars: &[OhlcvBar]) -> Vec<IndicatorSnapshot>;
}
