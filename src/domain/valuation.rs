//! Valuation context and industry RSI thresholds.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::error::ValtraderError;
use crate::ports::valuation_port::ValuationPort;

/// Price relative to an externally supplied fair value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuationContext {
    pub fair_value: f64,
    pub price_to_value_ratio: f64,
}

impl ValuationContext {
    pub fn new(code: &str, close: f64, fair_value: f64) -> Result<Self, ValtraderError> {
        if !fair_value.is_finite() || fair_value <= 0.0 {
            return Err(ValtraderError::InvalidValuation {
                code: code.to_string(),
                reason: format!("fair value must be positive, got {fair_value}"),
            });
        }
        if !close.is_finite() || close <= 0.0 {
            return Err(ValtraderError::InvalidValuation {
                code: code.to_string(),
                reason: format!("close must be positive, got {close}"),
            });
        }
        Ok(ValuationContext {
            fair_value,
            price_to_value_ratio: close / fair_value,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndustryThresholds {
    pub oversold: f64,
    pub overbought: f64,
    pub extreme_oversold: f64,
    pub extreme_overbought: f64,
}

impl Default for IndustryThresholds {
    fn default() -> Self {
        IndustryThresholds {
            oversold: 30.0,
            overbought: 70.0,
            extreme_oversold: 20.0,
            extreme_overbought: 80.0,
        }
    }
}

impl IndustryThresholds {
    /// extreme_oversold <= oversold < overbought <= extreme_overbought, all within 0..=100.
    pub fn is_ordered(&self) -> bool {
        (0.0..=100.0).contains(&self.extreme_oversold)
            && (0.0..=100.0).contains(&self.extreme_overbought)
            && self.extreme_oversold <= self.oversold
            && self.oversold < self.overbought
            && self.overbought <= self.extreme_overbought
    }
}

/// Read-through cache of per-instrument thresholds.
///
/// Owned by the backtest loop; each instrument is resolved against the
/// valuation port once and falls back to `defaults` when the industry or
/// its thresholds are unknown.
#[derive(Debug, Clone, Default)]
pub struct ThresholdResolver {
    defaults: IndustryThresholds,
    cache: BTreeMap<String, IndustryThresholds>,
}

impl ThresholdResolver {
    pub fn new(defaults: IndustryThresholds) -> Self {
        ThresholdResolver {
            defaults,
            cache: BTreeMap::new(),
        }
    }

    pub fn resolve(&mut self, code: &str, port: &dyn ValuationPort) -> IndustryThresholds {
        if let Some(thresholds) = self.cache.get(code) {
            return *thresholds;
        }
        let industry = port.industry(code);
        let thresholds = industry
            .as_deref()
            .and_then(|name| port.industry_thresholds(name))
            .filter(IndustryThresholds::is_ordered)
            .unwrap_or(self.defaults);
        debug!(code, industry = ?industry, ?thresholds, "resolved industry thresholds");
        self.cache.insert(code.to_string(), thresholds);
        thresholds
    }
}
