//! OHLCV bar representation, corporate actions and weekly resampling.

use chrono::{Datelike, Duration, NaiveDate};

/// Cash dividend and share distributions attached to a bar's date.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorporateAction {
    pub dividend_per_share: f64,
    /// Bonus shares per share held (0.1 = 1 bonus share for every 10).
    pub bonus_ratio: f64,
    /// Capital-reserve transfer shares per share held.
    pub transfer_ratio: f64,
}

impl CorporateAction {
    pub fn is_empty(&self) -> bool {
        self.dividend_per_share == 0.0 && self.bonus_ratio == 0.0 && self.transfer_ratio == 0.0
    }

    /// Multiplier applied to the share count: 1 + bonus + transfer.
    pub fn share_multiplier(&self) -> f64 {
        1.0 + self.bonus_ratio + self.transfer_ratio
    }

    /// Combine two actions falling into the same resampled period.
    pub fn merge(self, other: CorporateAction) -> CorporateAction {
        CorporateAction {
            dividend_per_share: self.dividend_per_share + other.dividend_per_share,
            bonus_ratio: self.bonus_ratio + other.bonus_ratio,
            transfer_ratio: self.transfer_ratio + other.transfer_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OhlcvBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub corporate_action: Option<CorporateAction>,
}

/// Friday closing the week (Saturday through Friday) that contains `date`.
pub fn week_ending_friday(date: NaiveDate) -> NaiveDate {
    let weekday = date.weekday().num_days_from_monday() as i64;
    let offset = (4 - weekday).rem_euclid(7);
    date + Duration::days(offset)
}

/// Aggregate daily bars into weekly bars labelled with the week-ending Friday.
///
/// open = first, high = max, low = min, close = last, volume = sum.
/// Corporate actions inside the week are merged onto the weekly bar.
/// Input must be sorted by date; the output is sorted as well.
pub fn resample_weekly(bars: &[OhlcvBar]) -> Vec<OhlcvBar> {
    let mut weekly: Vec<OhlcvBar> = Vec::new();

    for bar in bars {
        let week_end = week_ending_friday(bar.date);
        match weekly.last_mut() {
            Some(current) if current.date == week_end => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
                current.corporate_action = match (current.corporate_action, bar.corporate_action) {
                    (Some(a), Some(b)) => Some(a.merge(b)),
                    (a, b) => a.or(b),
                };
            }
            _ => weekly.push(OhlcvBar {
                date: week_end,
                ..bar.clone()
            }),
        }
    }

    weekly
}
