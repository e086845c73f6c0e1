#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use valtrader::domain::backtest::{BacktestConfig, BacktestLoop, Frequency};
use valtrader::domain::costs::TransactionCostModel;
use valtrader::domain::error::ValtraderError;
use valtrader::domain::indicator::{BollingerValue, Divergence, IndicatorSnapshot};
pub use valtrader::domain::ohlcv::{CorporateAction, OhlcvBar};
use valtrader::domain::signal::{ScorerConfig, SignalScorer};
use valtrader::domain::sizing::PositionSizer;
use valtrader::domain::valuation::IndustryThresholds;
use valtrader::ports::data_port::DataPort;
use valtrader::ports::indicator_port::IndicatorPort;
use valtrader::ports::valuation_port::ValuationPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, ValtraderError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(ValtraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockValuationPort {
    pub fair_values: BTreeMap<String, f64>,
    pub industries: BTreeMap<String, String>,
    pub thresholds: BTreeMap<String, IndustryThresholds>,
}

impl MockValuationPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fair_value(mut self, code: &str, fair_value: f64) -> Self {
        self.fair_values.insert(code.to_string(), fair_value);
        self
    }

    pub fn with_industry(mut self, code: &str, industry: &str, thresholds: IndustryThresholds) -> Self {
        self.industries.insert(code.to_string(), industry.to_string());
        self.thresholds.insert(industry.to_string(), thresholds);
        self
    }
}

impl ValuationPort for MockValuationPort {
    fn fair_value(&self, code: &str) -> Option<f64> {
        self.fair_values.get(code).copied()
    }

    fn industry(&self, code: &str) -> Option<String> {
        self.industries.get(code).cloned()
    }

    fn industry_thresholds(&self, industry: &str) -> Option<IndustryThresholds> {
        self.thresholds.get(industry).copied()
    }
}

/// Snapshots driven by price levels rather than real indicator maths.
///
/// A close at or below `buy_at_or_below` gets oversold RSI and a close under
/// the lower band on normal volume (two buy dimensions); a close at or above
/// `sell_at_or_above` gets the mirror. Everything else is neutral.
pub struct ScriptedIndicators {
    pub buy_at_or_below: f64,
    pub sell_at_or_above: f64,
}

impl IndicatorPort for ScriptedIndicators {
    fn snapshots(&self, bars: &[OhlcvBar]) -> Vec<IndicatorSnapshot> {
        bars.iter()
            .map(|bar| {
                let (rsi, band) = if bar.close <= self.buy_at_or_below {
                    (15.0, (bar.close + 5.0, bar.close + 1.0))
                } else if bar.close >= self.sell_at_or_above {
                    (85.0, (bar.close - 1.0, bar.close - 5.0))
                } else {
                    (50.0, (bar.close * 2.0, bar.close / 2.0))
                };
                IndicatorSnapshot {
                    date: bar.date,
                    close: bar.close,
                    volume: bar.volume,
                    ema: Some(bar.close),
                    rsi: Some(rsi),
                    macd: None,
                    bollinger: Some(BollingerValue {
                        upper: band.0,
                        middle: (band.0 + band.1) / 2.0,
                        lower: band.1,
                    }),
                    volume_ma: Some(bar.volume / 2.0),
                    divergence: Divergence::default(),
                }
            })
            .collect()
    }
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_bar(code: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        code: code.to_string(),
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 10_000.0,
        corporate_action: None,
    }
}

/// One Friday bar per close, starting 2023-01-06.
pub fn weekly_bars(code: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(code, d("2023-01-06") + Duration::weeks(i as i64), close))
        .collect()
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        start_date: d("2023-01-01"),
        end_date: d("2024-12-31"),
        warmup_start: d("2023-01-01"),
        initial_capital: 1_000_000.0,
        frequency: Frequency::Daily,
        lot_size: 100,
        periods_per_year: 52.0,
        risk_free_rate: 0.0,
    }
}

pub fn make_engine(min_history: usize) -> BacktestLoop {
    BacktestLoop::new(
        sample_config(),
        SignalScorer::new(ScorerConfig {
            min_history,
            ..ScorerConfig::default()
        }),
        PositionSizer::default(),
        TransactionCostModel::default(),
    )
}
