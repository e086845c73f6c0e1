//! Valuation and industry threshold lookup port trait.

use crate::domain::valuation::IndustryThresholds;

pub trait ValuationPort {
    /// Externally assessed fair value per share, if one exists.
    fn fair_value(&self, code: &str) -> Option<f64>;

    fn industry(&self, code: &str) -> Option<String>;

    /// RSI threshold quartet for an industry; `None` means use the static defaults.
    fn industry_thresholds(&self, industry: &str) -> Option<IndustryThresholds>;
}
