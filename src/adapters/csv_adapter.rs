//! CSV file market data adapter.
//!
//! One file per instrument at `<base_path>/<code>.csv`. Required columns are
//! `date,open,high,low,close,volume`; `dividend_per_share`, `bonus_ratio` and
//! `transfer_ratio` are optional and attach a corporate action to the bar.

use crate::domain::error::ValtraderError;
use crate::domain::ohlcv::{CorporateAction, OhlcvBar};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvBarAdapter {
    base_path: PathBuf,
}

/// Column positions resolved from the header row.
struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    dividend: Option<usize>,
    bonus: Option<usize>,
    transfer: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, ValtraderError> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let require = |name: &str| {
            find(name).ok_or_else(|| ValtraderError::Data {
                reason: format!("missing {name} column"),
            })
        };
        Ok(Self {
            date: require("date")?,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: require("volume")?,
            dividend: find("dividend_per_share"),
            bonus: find("bonus_ratio"),
            transfer: find("transfer_ratio"),
        })
    }
}

impl CsvBarAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", code))
    }
}

fn parse_field(record: &StringRecord, index: usize, name: &str) -> Result<f64, ValtraderError> {
    record
        .get(index)
        .ok_or_else(|| ValtraderError::Data {
            reason: format!("missing {name} value"),
        })?
        .trim()
        .parse()
        .map_err(|e| ValtraderError::Data {
            reason: format!("invalid {name} value: {e}"),
        })
}

/// Blank optional cells read as zero.
fn parse_optional(
    record: &StringRecord,
    index: Option<usize>,
    name: &str,
) -> Result<f64, ValtraderError> {
    let Some(i) = index else {
        return Ok(0.0);
    };
    match record.get(i).map(str::trim) {
        None | Some("") => Ok(0.0),
        Some(_) => parse_field(record, i, name),
    }
}

impl DataPort for CsvBarAdapter {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, ValtraderError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path).map_err(|e| ValtraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let columns = Columns::from_headers(rdr.headers()?)?;
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result?;

            let date_str = record.get(columns.date).ok_or_else(|| ValtraderError::Data {
                reason: "missing date value".into(),
            })?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|e| {
                ValtraderError::Data {
                    reason: format!("invalid date format: {}", e),
                }
            })?;

            if date < start_date || date > end_date {
                continue;
            }

            let action = CorporateAction {
                dividend_per_share: parse_optional(&record, columns.dividend, "dividend_per_share")?,
                bonus_ratio: parse_optional(&record, columns.bonus, "bonus_ratio")?,
                transfer_ratio: parse_optional(&record, columns.transfer, "transfer_ratio")?,
            };

            bars.push(OhlcvBar {
                code: code.to_string(),
                date,
                open: parse_field(&record, columns.open, "open")?,
                high: parse_field(&record, columns.high, "high")?,
                low: parse_field(&record, columns.low, "low")?,
                close: parse_field(&record, columns.close, "close")?,
                volume: parse_field(&record, columns.volume, "volume")?,
                corporate_action: (!action.is_empty()).then_some(action),
            });
        }

        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        debug!(code, bars = bars.len(), path = %path.display(), "loaded bars");
        Ok(bars)
    }
}
