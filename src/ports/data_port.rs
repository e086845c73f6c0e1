//! Market data access port trait.

use crate::domain::error::ValtraderError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Date-ordered bars for `code` within `[start_date, end_date]`.
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, ValtraderError>;
}
