//! Technical indicators and the per-bar snapshot consumed by the signal scorer.
//!
//! - `IndicatorSnapshot`: every indicator value for one instrument on one date
//! - `IndicatorConfig`: periods and multipliers
//! - `StandardIndicators`: the default `IndicatorPort` implementation
//!
//! Values still inside their warm-up window are `None`.

pub mod bollinger;
pub mod divergence;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use bollinger::{calculate_bollinger, BollingerValue};
pub use divergence::{detect_divergence, Divergence};
pub use ema::calculate_ema;
pub use macd::{calculate_macd, MacdValue};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

use chrono::NaiveDate;

use crate::domain::ohlcv::OhlcvBar;
use crate::ports::indicator_port::IndicatorPort;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
    pub ema: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdValue>,
    pub bollinger: Option<BollingerValue>,
    pub volume_ma: Option<f64>,
    pub divergence: Divergence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub ema_period: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_stddev: f64,
    pub volume_ma_period: usize,
    pub divergence_lookback: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            ema_period: 20,
            rsi_period: 14,
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
            bb_period: 20,
            bb_stddev: 2.0,
            volume_ma_period: 4,
            divergence_lookback: 13,
        }
    }
}

/// Compute snapshots for a date-ordered bar series.
pub fn compute_snapshots(bars: &[OhlcvBar], config: &IndicatorConfig) -> Vec<IndicatorSnapshot> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let ema = calculate_ema(&closes, config.ema_period);
    let rsi = calculate_rsi(&closes, config.rsi_period);
    let macd = calculate_macd(&closes, config.macd_fast, config.macd_slow, config.macd_signal);
    let bollinger = calculate_bollinger(&closes, config.bb_period, config.bb_stddev);
    let volume_ma = calculate_sma(&volumes, config.volume_ma_period);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| IndicatorSnapshot {
            date: bar.date,
            close: bar.close,
            volume: bar.volume,
            ema: ema[i],
            rsi: rsi[i],
            macd: macd[i],
            bollinger: bollinger[i],
            volume_ma: volume_ma[i],
            divergence: detect_divergence(&closes, &rsi, i, config.divergence_lookback),
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct StandardIndicators {
    pub config: IndicatorConfig,
}

impl StandardIndicators {
    pub fn new(config: IndicatorConfig) -> Self {
        StandardIndicators { config }
    }
}

impl IndicatorPort for StandardIndicators {
    fn snapshots(&self, bars: &[OhlcvBar]) -> Vec<IndicatorSnapshot> {
        compute_snapshots(bars, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(n: usize) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 6).unwrap();
        (0..n)
            .map(|i| {
                let close = 10.0 + (i as f64 * 0.4).sin();
                OhlcvBar {
                    code: "000001".into(),
                    date: start + chrono::Duration::weeks(i as i64),
                    open: close,
                    high: close + 0.1,
                    low: close - 0.1,
                    close,
                    volume: 1_000.0 + i as f64,
                    corporate_action: None,
                }
            })
            .collect()
    }

    #[test]
    fn snapshots_align_with_bars() {
        let input = bars(70);
        let snaps = StandardIndicators::default().snapshots(&input);
        assert_eq!(snaps.len(), 70);
        for (bar, snap) in input.iter().zip(&snaps) {
            assert_eq!(bar.date, snap.date);
            assert!((bar.close - snap.close).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn warmup_values_absent() {
        let snaps = compute_snapshots(&bars(70), &IndicatorConfig::default());
        assert!(snaps[0].ema.is_none());
        assert!(snaps[0].rsi.is_none());
        assert!(snaps[0].macd.is_none());
        assert!(snaps[2].volume_ma.is_none());
        assert!(snaps[3].volume_ma.is_some());
        let last = snaps.last().unwrap();
        assert!(last.ema.is_some());
        assert!(last.rsi.is_some());
        assert!(last.macd.is_some());
        assert!(last.bollinger.is_some());
    }

    #[test]
    fn empty_input() {
        assert!(compute_snapshots(&[], &IndicatorConfig::default()).is_empty());
    }
}
