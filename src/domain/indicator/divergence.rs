//! Price/RSI divergence detection.
//!
//! Over a window of `lookback + 1` bars ending at the current bar:
//! - top divergence: close sits at the window high (within 0.01) while RSI is
//!   more than 2% below the window's highest RSI
//! - bottom divergence: close sits at the window low while RSI is more than
//!   2% above the window's lowest RSI

const PRICE_TOLERANCE: f64 = 0.01;
const TOP_RSI_FACTOR: f64 = 0.98;
const BOTTOM_RSI_FACTOR: f64 = 1.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Divergence {
    pub top: bool,
    pub bottom: bool,
}

pub fn detect_divergence(
    closes: &[f64],
    rsi: &[Option<f64>],
    index: usize,
    lookback: usize,
) -> Divergence {
    if index >= closes.len() || index >= rsi.len() || index < lookback {
        return Divergence::default();
    }
    let Some(current_rsi) = rsi[index] else {
        return Divergence::default();
    };

    let start = index - lookback;
    let close = closes[index];
    let window = &closes[start..=index];
    let max_close = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_close = window.iter().copied().fold(f64::INFINITY, f64::min);

    let rsi_window: Vec<f64> = rsi[start..=index].iter().flatten().copied().collect();
    let max_rsi = rsi_window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_rsi = rsi_window.iter().copied().fold(f64::INFINITY, f64::min);

    Divergence {
        top: (close - max_close).abs() < PRICE_TOLERANCE && current_rsi < max_rsi * TOP_RSI_FACTOR,
        bottom: (close - min_close).abs() < PRICE_TOLERANCE
            && current_rsi > min_rsi * BOTTOM_RSI_FACTOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_divergence_new_high_weaker_rsi() {
        let closes = [10.0, 11.0, 10.5, 11.0];
        let rsi = [Some(60.0), Some(75.0), Some(55.0), Some(65.0)];
        let d = detect_divergence(&closes, &rsi, 3, 3);
        assert!(d.top);
        assert!(!d.bottom);
    }

    #[test]
    fn no_top_divergence_when_rsi_confirms() {
        let closes = [10.0, 11.0, 10.5, 11.5];
        let rsi = [Some(60.0), Some(70.0), Some(55.0), Some(72.0)];
        assert!(!detect_divergence(&closes, &rsi, 3, 3).top);
    }

    #[test]
    fn bottom_divergence_new_low_stronger_rsi() {
        let closes = [10.0, 9.0, 9.5, 9.0];
        let rsi = [Some(40.0), Some(25.0), Some(45.0), Some(32.0)];
        let d = detect_divergence(&closes, &rsi, 3, 3);
        assert!(d.bottom);
        assert!(!d.top);
    }

    #[test]
    fn insufficient_window_or_missing_rsi() {
        let closes = [10.0, 11.0];
        let rsi = [Some(50.0), None];
        assert_eq!(detect_divergence(&closes, &rsi, 1, 3), Divergence::default());
        assert_eq!(detect_divergence(&closes, &rsi, 1, 1), Divergence::default());
    }
}
