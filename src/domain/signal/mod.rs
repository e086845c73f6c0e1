//! Four-dimension signal scorer.
//!
//! A valuation gate decides which side is eligible; three technical
//! dimensions (RSI, MACD momentum, Bollinger/volume) then vote. A side fires
//! only when its gate holds and at least two dimensions support it. SELL is
//! evaluated before BUY.

pub mod dimensions;
pub mod trend;

use std::fmt;
use std::fmt::Write as _;

use tracing::debug;

use crate::domain::error::ValtraderError;
use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::valuation::{IndustryThresholds, ValuationContext};

pub use dimensions::Support;
pub use trend::TrendDirection;

/// Dimensions required to agree before a gated signal fires.
pub const REQUIRED_DIMENSIONS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Sell => write!(f, "SELL"),
            SignalKind::Hold => write!(f, "HOLD"),
        }
    }
}

/// Which side the hard gate allows, and what it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gate {
    Valuation { ratio: f64, eligible: Option<SignalKind> },
    Trend { direction: TrendDirection, eligible: Option<SignalKind> },
    Unavailable,
}

impl Gate {
    pub fn eligible(&self) -> Option<SignalKind> {
        match self {
            Gate::Valuation { eligible, .. } | Gate::Trend { eligible, .. } => *eligible,
            Gate::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimensionFlags {
    pub rsi: Support,
    pub momentum: Support,
    pub volume: Support,
}

impl DimensionFlags {
    pub fn sell_count(&self) -> u8 {
        [self.rsi.sell, self.momentum.sell, self.volume.sell]
            .iter()
            .filter(|&&s| s)
            .count() as u8
    }

    pub fn buy_count(&self) -> u8 {
        [self.rsi.buy, self.momentum.buy, self.volume.buy]
            .iter()
            .filter(|&&b| b)
            .count() as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecision {
    pub kind: SignalKind,
    /// 1 + supporting dimension count for BUY/SELL, 0 for HOLD.
    pub confidence: u8,
    pub gate: Gate,
    pub dimensions: DimensionFlags,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorerConfig {
    pub min_history: usize,
    /// Ratio strictly below this makes BUY eligible.
    pub value_ratio_buy_threshold: f64,
    /// Ratio strictly above this makes SELL eligible.
    pub value_ratio_sell_threshold: f64,
    pub volume_sell_multiplier: f64,
    pub volume_buy_multiplier: f64,
    pub trend_fallback: bool,
    pub trend_periods: usize,
    pub trend_flat_threshold: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            min_history: 60,
            value_ratio_buy_threshold: 0.70,
            value_ratio_sell_threshold: 0.80,
            volume_sell_multiplier: 1.3,
            volume_buy_multiplier: 0.8,
            trend_fallback: true,
            trend_periods: 8,
            trend_flat_threshold: 0.003,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    pub config: ScorerConfig,
}

impl SignalScorer {
    pub fn new(config: ScorerConfig) -> Self {
        SignalScorer { config }
    }

    /// Score the last snapshot of `history`.
    ///
    /// `history` is date ordered and ends at the evaluation date. Pure: the
    /// same inputs always give the same decision.
    pub fn score(
        &self,
        code: &str,
        history: &[IndicatorSnapshot],
        valuation: Option<&ValuationContext>,
        thresholds: &IndustryThresholds,
    ) -> Result<SignalDecision, ValtraderError> {
        let minimum = self.config.min_history.max(1);
        let Some(current) = history.last().filter(|_| history.len() >= minimum) else {
            return Err(ValtraderError::InsufficientData {
                code: code.to_string(),
                bars: history.len(),
                minimum,
            });
        };

        let gate = self.gate(history, current, valuation);
        let dimensions = DimensionFlags {
            rsi: dimensions::rsi_support(current, thresholds),
            momentum: dimensions::momentum_support(history),
            volume: dimensions::volume_support(
                current,
                self.config.volume_sell_multiplier,
                self.config.volume_buy_multiplier,
            ),
        };

        let sell_count = dimensions.sell_count();
        let buy_count = dimensions.buy_count();

        let (kind, count) = match gate.eligible() {
            Some(SignalKind::Sell) if sell_count >= REQUIRED_DIMENSIONS => {
                (SignalKind::Sell, sell_count)
            }
            Some(SignalKind::Buy) if buy_count >= REQUIRED_DIMENSIONS => {
                (SignalKind::Buy, buy_count)
            }
            _ => (SignalKind::Hold, 0),
        };
        let confidence = if kind == SignalKind::Hold { 0 } else { 1 + count };
        let reason = describe(kind, &gate, sell_count, buy_count);

        debug!(
            code,
            date = %current.date,
            %kind,
            confidence,
            sell_count,
            buy_count,
            ?gate,
            "scored"
        );

        Ok(SignalDecision {
            kind,
            confidence,
            gate,
            dimensions,
            reason,
        })
    }

    fn gate(
        &self,
        history: &[IndicatorSnapshot],
        current: &IndicatorSnapshot,
        valuation: Option<&ValuationContext>,
    ) -> Gate {
        if let Some(ctx) = valuation {
            let ratio = ctx.price_to_value_ratio;
            let eligible = if ratio > self.config.value_ratio_sell_threshold {
                Some(SignalKind::Sell)
            } else if ratio < self.config.value_ratio_buy_threshold {
                Some(SignalKind::Buy)
            } else {
                None
            };
            return Gate::Valuation { ratio, eligible };
        }

        if !self.config.trend_fallback {
            return Gate::Unavailable;
        }
        let Some(ema_now) = current.ema else {
            return Gate::Unavailable;
        };
        let ema: Vec<f64> = history.iter().filter_map(|s| s.ema).collect();
        let Some(direction) = trend::classify_trend(
            &ema,
            self.config.trend_periods,
            self.config.trend_flat_threshold,
        ) else {
            return Gate::Unavailable;
        };

        let eligible = match direction {
            TrendDirection::Up if current.close > ema_now => Some(SignalKind::Sell),
            TrendDirection::Down if current.close < ema_now => Some(SignalKind::Buy),
            _ => None,
        };
        Gate::Trend {
            direction,
            eligible,
        }
    }

    /// Multi-line breakdown of a decision for the `explain` command.
    pub fn explain(&self, code: &str, date: chrono::NaiveDate, decision: &SignalDecision) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{code} @ {date}: {} (confidence {})", decision.kind, decision.confidence);
        let gate_line = match decision.gate {
            Gate::Valuation { ratio, eligible } => format!(
                "valuation ratio {ratio:.3} (buy < {:.2}, sell > {:.2}) -> {}",
                self.config.value_ratio_buy_threshold,
                self.config.value_ratio_sell_threshold,
                eligible_label(eligible)
            ),
            Gate::Trend { direction, eligible } => {
                format!("ema trend {direction:?} -> {}", eligible_label(eligible))
            }
            Gate::Unavailable => "unavailable".to_string(),
        };
        let _ = writeln!(out, "  gate:     {gate_line}");
        let flags = &decision.dimensions;
        for (name, support) in [
            ("rsi", flags.rsi),
            ("momentum", flags.momentum),
            ("volume", flags.volume),
        ] {
            let _ = writeln!(
                out,
                "  {name:<9} sell={} buy={}",
                yes_no(support.sell),
                yes_no(support.buy)
            );
        }
        let _ = write!(out, "  reason:   {}", decision.reason);
        out
    }
}

fn describe(kind: SignalKind, gate: &Gate, sell_count: u8, buy_count: u8) -> String {
    match (kind, gate.eligible()) {
        (SignalKind::Sell, _) => format!("sell gate with {sell_count}/3 dimensions"),
        (SignalKind::Buy, _) => format!("buy gate with {buy_count}/3 dimensions"),
        (SignalKind::Hold, Some(SignalKind::Sell)) => {
            format!("sell gate but only {sell_count}/3 dimensions")
        }
        (SignalKind::Hold, Some(SignalKind::Buy)) => {
            format!("buy gate but only {buy_count}/3 dimensions")
        }
        (SignalKind::Hold, _) if matches!(gate, Gate::Unavailable) => {
            "no valuation or trend gate".to_string()
        }
        (SignalKind::Hold, _) => "gate closed".to_string(),
    }
}

fn eligible_label(eligible: Option<SignalKind>) -> String {
    eligible.map_or_else(|| "none".to_string(), |k| k.to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
