//! The three technical dimensions voted on by the signal scorer.

use crate::domain::indicator::IndicatorSnapshot;
use crate::domain::valuation::IndustryThresholds;

/// Which side a dimension supports on the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Support {
    pub sell: bool,
    pub buy: bool,
}

/// RSI against industry thresholds, confirmed by divergence below the extremes.
pub fn rsi_support(current: &IndicatorSnapshot, thresholds: &IndustryThresholds) -> Support {
    let Some(rsi) = current.rsi else {
        return Support::default();
    };
    Support {
        sell: rsi >= thresholds.extreme_overbought
            || (rsi >= thresholds.overbought && current.divergence.top),
        buy: rsi <= thresholds.extreme_oversold
            || (rsi <= thresholds.oversold && current.divergence.bottom),
    }
}

/// MACD histogram exhaustion, histogram colour, or a DIF/DEA cross.
///
/// A negative (green) current bar supports SELL and a positive (red) one
/// supports BUY, so both sides can hold at once; the gate picks one.
/// Needs three bars with MACD values; `history` ends at the current bar.
pub fn momentum_support(history: &[IndicatorSnapshot]) -> Support {
    if history.len() < 3 {
        return Support::default();
    }
    let tail = &history[history.len() - 3..];
    let (Some(m2), Some(m1), Some(m0)) = (tail[0].macd, tail[1].macd, tail[2].macd) else {
        return Support::default();
    };
    let (h2, h1, h0) = (m2.hist, m1.hist, m0.hist);

    let red_shrinking = h2 > 0.0 && h1 > 0.0 && h0 > 0.0 && h0 < h1 && h1 < h2;
    let dead_cross = m0.dif < m0.dea && m1.dif >= m1.dea;

    let green_shrinking = h2 < 0.0 && h1 < 0.0 && h0 < 0.0 && h0 > h1 && h1 > h2;
    let golden_cross = m0.dif > m0.dea && m1.dif <= m1.dea;

    Support {
        sell: red_shrinking || h0 < 0.0 || dead_cross,
        buy: green_shrinking || h0 > 0.0 || golden_cross,
    }
}

/// Close outside a Bollinger band on qualifying volume.
pub fn volume_support(
    current: &IndicatorSnapshot,
    sell_multiplier: f64,
    buy_multiplier: f64,
) -> Support {
    let (Some(bands), Some(baseline)) = (current.bollinger, current.volume_ma) else {
        return Support::default();
    };
    Support {
        sell: current.close >= bands.upper && current.volume >= baseline * sell_multiplier,
        buy: current.close <= bands.lower && current.volume >= baseline * buy_multiplier,
    }
}
