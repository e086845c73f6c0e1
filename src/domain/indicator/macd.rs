//! MACD (Moving Average Convergence Divergence).
//!
//! DIF = EMA(fast) - EMA(slow)
//! DEA = EMA(signal) of DIF, seeded with the SMA of the first `signal` DIF values
//! HIST = DIF - DEA
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: slow - 1 + signal - 1 values.

use super::ema::calculate_ema;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub dif: f64,
    pub dea: f64,
    pub hist: f64,
}

pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Vec<Option<MacdValue>> {
    let mut out = vec![None; closes.len()];
    if fast == 0 || slow == 0 || signal_period == 0 {
        return out;
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    let dif: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let Some(first) = dif.iter().position(Option::is_some) else {
        return out;
    };
    let dif_values: Vec<f64> = dif[first..].iter().map(|v| v.unwrap_or(0.0)).collect();
    let dea = calculate_ema(&dif_values, signal_period);

    for (offset, dea_value) in dea.into_iter().enumerate() {
        if let Some(dea) = dea_value {
            let dif = dif_values[offset];
            out[first + offset] = Some(MacdValue {
                dif,
                dea,
                hist: dif - dea,
            });
        }
    }

    out
}

pub fn calculate_macd_default(closes: &[f64]) -> Vec<Option<MacdValue>> {
    calculate_macd(closes, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
