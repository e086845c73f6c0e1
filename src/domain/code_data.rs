//! Per-instrument prepared data and the unified trading timeline.

use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct CodeData {
    pub code: String,
    pub bars: Vec<OhlcvBar>,
    /// One snapshot per bar, index aligned with `bars`.
    pub snapshots: Vec<IndicatorSnapshot>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl CodeData {
    pub fn new(code: String, bars: Vec<OhlcvBar>, snapshots: Vec<IndicatorSnapshot>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            code,
            bars,
            snapshots,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn get_bar_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    /// Snapshots from the first bar up to and including `date`.
    pub fn history_until(&self, date: NaiveDate) -> Option<&[IndicatorSnapshot]> {
        self.get_bar_index(date)
            .and_then(|i| self.snapshots.get(..=i))
    }

    /// Last close on or before `date`.
    pub fn close_on_or_before(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.bars.partition_point(|b| b.date <= date);
        idx.checked_sub(1).map(|i| self.bars[i].close)
    }
}

/// Sorted union of every bar date within `[start, end]`.
pub fn build_unified_timeline(codes: &[CodeData], start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = codes
        .iter()
        .flat_map(|cd| cd.bars.iter().map(|bar| bar.date))
        .filter(|d| *d >= start && *d <= end)
        .collect();
    unique_dates.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(code: &str, date: &str, close: f64) -> OhlcvBar {
        OhlcvBar {
            code: code.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000.0,
            corporate_action: None,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn code_data(code: &str, bars: Vec<OhlcvBar>) -> CodeData {
        CodeData::new(code.into(), bars, Vec::new())
    }

    #[test]
    fn code_data_new_builds_date_index() {
        let cd = code_data(
            "600000",
            vec![
                make_bar("600000", "2024-01-05", 100.0),
                make_bar("600000", "2024-01-12", 101.0),
            ],
        );
        assert_eq!(cd.bar_count(), 2);
        assert_eq!(cd.get_bar_index(d("2024-01-12")), Some(1));
        assert!((cd.get_bar(d("2024-01-05")).unwrap().close - 100.0).abs() < f64::EPSILON);
        assert!(cd.get_bar(d("2024-01-19")).is_none());
    }

    #[test]
    fn close_carries_forward() {
        let cd = code_data(
            "600000",
            vec![
                make_bar("600000", "2024-01-05", 100.0),
                make_bar("600000", "2024-01-19", 102.0),
            ],
        );
        assert_eq!(cd.close_on_or_before(d("2024-01-01")), None);
        assert_eq!(cd.close_on_or_before(d("2024-01-12")), Some(100.0));
        assert_eq!(cd.close_on_or_before(d("2024-01-19")), Some(102.0));
    }

    #[test]
    fn unified_timeline_merges_sorts_and_clips() {
        let a = code_data(
            "600000",
            vec![
                make_bar("600000", "2024-01-05", 100.0),
                make_bar("600000", "2024-01-19", 101.0),
            ],
        );
        let b = code_data(
            "000001",
            vec![
                make_bar("000001", "2023-12-29", 50.0),
                make_bar("000001", "2024-01-12", 51.0),
            ],
        );
        let timeline = build_unified_timeline(&[a, b], d("2024-01-01"), d("2024-12-31"));
        assert_eq!(timeline, vec![d("2024-01-05"), d("2024-01-12"), d("2024-01-19")]);
    }

    #[test]
    fn unified_timeline_empty_codes() {
        assert!(build_unified_timeline(&[], d("2024-01-01"), d("2024-12-31")).is_empty());
    }
}
